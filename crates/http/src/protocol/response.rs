//! HTTP response construction and one-shot transmission.
//!
//! A [`Response`] starts out [`Pending`]: status, headers, body or a file download can
//! be changed freely. [`Response::send`] consumes it, writes status line, headers and
//! body to the transport, and hands back a [`Response<Sent>`] that only allows reads.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use http::{StatusCode, Version, header};
use mime::Mime;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::debug;

use crate::codec::HeadEncoder;
use crate::ensure;
use crate::protocol::{
    Download, DownloadError, DownloadOptions, HeaderBag, HeaderError, Message, ParseError, Request, SendError, Transfer,
    version_str,
};

/// Headers owned by a configured download; dropped again when a plain body replaces it.
const DOWNLOAD_HEADERS: [&str; 5] =
    ["content-type", "content-range", "content-length", "content-disposition", "accept-ranges"];

mod sealed {
    pub trait Sealed {}
}

/// Lifecycle state of a [`Response`].
pub trait State: sealed::Sealed {
    const SENT: bool;
}

/// Not transmitted yet; every setter is available.
#[derive(Debug, Clone, Copy)]
pub struct Pending;

/// Transmitted; nothing can be changed or sent again.
#[derive(Debug, Clone, Copy)]
pub struct Sent;

impl sealed::Sealed for Pending {}
impl sealed::Sealed for Sent {}

impl State for Pending {
    const SENT: bool = false;
}

impl State for Sent {
    const SENT: bool = true;
}

/// Status line and headers, borrowed from a response for encoding.
#[derive(Debug, Clone, Copy)]
pub struct ResponseHead<'a> {
    pub version: Version,
    pub status: StatusCode,
    pub reason: &'a str,
    pub headers: &'a HeaderBag,
}

pub struct Response<S: State = Pending> {
    message: Message,
    status: StatusCode,
    reason: Option<String>,
    range: Option<String>,
    download: Option<Download>,
    state: PhantomData<S>,
}

impl<S: State> fmt::Debug for Response<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("reason", &self.reason())
            .field("message", &self.message)
            .field("download", &self.download)
            .field("sent", &S::SENT)
            .finish()
    }
}

impl Default for Response<Pending> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> Response<S> {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The explicitly set reason phrase, or the standard one for the status code.
    pub fn reason(&self) -> &str {
        self.reason.as_deref().or_else(|| self.status.canonical_reason()).unwrap_or_default()
    }

    /// E.g. `HTTP/1.1 206 Partial Content`.
    pub fn status_line(&self) -> String {
        format!("{} {} {}", version_str(self.version()), self.status.as_str(), self.reason())
    }

    pub fn head(&self) -> ResponseHead<'_> {
        ResponseHead { version: self.version(), status: self.status, reason: self.reason(), headers: self.headers() }
    }

    pub fn version(&self) -> Version {
        self.message.version()
    }

    pub fn headers(&self) -> &HeaderBag {
        self.message.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.message.header(name)
    }

    pub fn body(&self) -> &Bytes {
        self.message.body()
    }

    pub fn download(&self) -> Option<&Download> {
        self.download.as_ref()
    }

    pub fn has_download(&self) -> bool {
        self.download.is_some()
    }

    pub fn is_sent(&self) -> bool {
        S::SENT
    }
}

impl Response<Pending> {
    pub fn new() -> Self {
        Self {
            message: Message::new(),
            status: StatusCode::OK,
            reason: None,
            range: None,
            download: None,
            state: PhantomData,
        }
    }

    /// A response answering `request`: same protocol version, and its `Range` header
    /// is kept for [`Response::set_download`].
    pub fn for_request(request: &Request) -> Self {
        let mut response = Self::new();
        response.message = Message::reply_to(request.message());
        response.range = request.header(header::RANGE.as_str()).map(str::to_string);
        response
    }

    /// # Errors
    ///
    /// Returns [`ParseError::UnsupportedVersion`] for versions a message cannot carry.
    pub fn set_version(&mut self, version: Version) -> Result<(), ParseError> {
        self.message.set_version(version)
    }

    /// Sets the status code and resets the reason phrase to the standard one.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidStatus`] outside `100..=599`.
    pub fn set_status(&mut self, code: u16) -> Result<(), SendError> {
        ensure!((100..=599).contains(&code), SendError::invalid_status(code));
        let Ok(status) = StatusCode::from_u16(code) else {
            return Err(SendError::invalid_status(code));
        };
        self.status = status;
        self.reason = None;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SendError::InvalidStatus`] for codes outside `100..=599` or a reason
    /// phrase containing control characters.
    pub fn set_status_with_reason(&mut self, code: u16, reason: &str) -> Result<(), SendError> {
        ensure!(!reason.chars().any(|c| c.is_control() && c != '\t'), SendError::invalid_status(code));
        self.set_status(code)?;
        self.reason = Some(reason.to_string());
        Ok(())
    }

    pub fn headers_mut(&mut self) -> &mut HeaderBag {
        self.message.headers_mut()
    }

    /// # Errors
    ///
    /// Returns [`HeaderError`] for invalid names or values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        self.message.set_header(name, value)
    }

    /// # Errors
    ///
    /// Returns [`HeaderError`] for invalid names or values.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        self.message.headers_mut().append(name, value)
    }

    /// # Errors
    ///
    /// Returns [`HeaderError`] if the rendered media type is not a valid header value.
    pub fn set_content_type(&mut self, mime: &Mime) -> Result<(), HeaderError> {
        self.set_header("Content-Type", mime.as_ref())
    }

    /// Replaces the body, dropping any configured download and the headers it set.
    ///
    /// A status left over from the download goes back to `200 OK`; one set after it
    /// is kept.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        if let Some(download) = self.download.take() {
            let headers = self.message.headers_mut();
            for name in DOWNLOAD_HEADERS {
                headers.remove(name);
            }
            if self.status == download.status() && self.reason.is_none() {
                self.status = StatusCode::OK;
            }
        }
        self.message.set_body(body);
    }

    /// Serializes `value` as the JSON body and sets `Content-Type: application/json`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidBody`] when `value` cannot be serialized.
    pub fn set_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SendError> {
        let body = serde_json::to_vec(value).map_err(SendError::invalid_body)?;
        self.set_body(body);
        self.set_content_type(&mime::APPLICATION_JSON).map_err(SendError::invalid_body)
    }

    /// Serves the file at `path` as the body, honouring the request's `Range` header.
    ///
    /// Status, `Content-Type`, `Content-Length`, `Content-Range`, `Accept-Ranges` and
    /// `Content-Disposition` are set from the planned transfer. A missing `Range`
    /// header gives `200`, a malformed or unsatisfiable one `416`, otherwise `206`
    /// with a single slice or a `multipart/x-byteranges` body.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidArgument`] when `path` is not a readable
    /// regular file; the response is left untouched.
    pub fn set_download(&mut self, path: impl AsRef<Path>, options: DownloadOptions) -> Result<(), DownloadError> {
        let download = Download::prepare(path, options, self.range.as_deref())?;

        let mut headers = self.message.headers().clone();
        for name in DOWNLOAD_HEADERS {
            headers.remove(name);
        }
        let mut entries = Vec::with_capacity(5);
        // a 416 carries no representation, only the range framing
        if !matches!(download.transfer(), Transfer::Unsatisfiable) {
            entries.push(("Content-Type", download.content_type()));
            entries.push(("Content-Disposition", download.content_disposition()));
        }
        entries.push(("Content-Length", download.content_length().to_string()));
        if download.accept_ranges() {
            entries.push(("Accept-Ranges", "bytes".to_string()));
        }
        if let Some(content_range) = download.content_range() {
            entries.push(("Content-Range", content_range));
        }
        for (name, value) in &entries {
            headers.set(name, value).map_err(DownloadError::invalid_argument)?;
        }

        debug!(status = download.status().as_u16(), content_length = download.content_length(), "configured download");
        self.status = download.status();
        self.reason = None;
        *self.message.headers_mut() = headers;
        self.message.set_body(Bytes::new());
        self.download = Some(download);
        Ok(())
    }

    /// Writes status line, headers and body to `writer`, exactly once.
    ///
    /// `Content-Length` is filled from the body when it was not set explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] when writing fails or a download file changed size.
    pub async fn send<W>(mut self, writer: &mut W) -> Result<Response<Sent>, SendError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.download.is_none() && !self.message.headers().has("Content-Length") {
            let length = self.message.body().len().to_string();
            self.message.set_header("Content-Length", &length).map_err(SendError::invalid_body)?;
        }

        let mut head = BytesMut::new();
        HeadEncoder.encode(self.head(), &mut head)?;
        writer.write_all(&head).await?;

        let body_len = match &self.download {
            Some(download) => download.write_body(writer).await?,
            None => {
                writer.write_all(self.message.body()).await?;
                self.message.body().len() as u64
            }
        };
        writer.flush().await?;

        debug!(status = self.status.as_u16(), head_len = head.len(), body_len, "response sent");
        Ok(Response {
            message: self.message,
            status: self.status,
            reason: self.reason,
            range: self.range,
            download: self.download,
            state: PhantomData,
        })
    }
}
