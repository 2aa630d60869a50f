//! Request head decoder: raw HTTP/1.x bytes into a [`RequestHead`].
//!
//! Parsing is done by `httparse`. Once a complete head is found it is split off the
//! source buffer, leaving any body bytes behind for the caller.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB

use std::mem::MaybeUninit;
use std::str::FromStr;

use bytes::{Buf, BytesMut};
use http::{Method, Uri, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{HeaderBag, ParseError, RequestHead};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP request heads implementing the [`Decoder`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadDecoder;

impl Decoder for HeadDecoder {
    type Item = RequestHead;
    type Error = ParseError;

    /// Returns `Ok(None)` until a complete head is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if:
    /// - The number of headers exceeds `MAX_HEADER_NUM`
    /// - The head exceeds `MAX_HEADER_BYTES`
    /// - The HTTP version is not 1.0 or 1.1
    /// - Method, target or headers are malformed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // the shortest head is "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            return Ok(None);
        }

        let mut req = httparse::Request::new(&mut []);
        let mut headers = [MaybeUninit::<httparse::Header<'_>>::uninit(); MAX_HEADER_NUM];

        let parsed = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let body_offset = match parsed {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(head_size = body_offset, header_count = req.headers.len(), "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            other => return Err(ParseError::unsupported_version(format!("HTTP/1.{}", other.unwrap_or_default()))),
        };
        let method = req.method.and_then(|m| Method::from_str(m).ok()).ok_or(ParseError::InvalidMethod)?;
        let uri = req.path.and_then(|p| Uri::from_str(p).ok()).ok_or(ParseError::InvalidUri)?;

        let mut bag = HeaderBag::with_capacity(req.headers.len());
        for header in req.headers.iter() {
            let value = std::str::from_utf8(header.value)
                .map_err(|e| ParseError::invalid_header(format!("value of {} is not utf-8: {e}", header.name)))?;
            bag.append(header.name, value)?;
        }

        let head = RequestHead { method, uri, version, headers: bag };
        src.advance(body_offset);
        Ok(Some(head))
    }
}

/// Number of body bytes announced by the head.
///
/// # Errors
///
/// Returns [`ParseError::InvalidBody`] for a malformed `Content-Length`, or when
/// `Transfer-Encoding` is present, since chunked bodies are not decoded here.
pub fn body_length(headers: &HeaderBag) -> Result<u64, ParseError> {
    ensure!(
        !headers.has(http::header::TRANSFER_ENCODING.as_str()),
        ParseError::invalid_body("transfer-encoding is not supported")
    );

    match headers.get_all(http::header::CONTENT_LENGTH.as_str()) {
        [] => Ok(0),
        [value] => value.trim().parse().map_err(|e| ParseError::invalid_body(format!("content-length {value} is not u64: {e}"))),
        _ => Err(ParseError::invalid_body("content-length present more than once")),
    }
}
