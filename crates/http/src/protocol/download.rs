//! File download planning: byte ranges, partial content and multipart framing.
//!
//! A [`Download`] is planned once, when the response is configured, from the file's
//! current length and the inbound `Range` header. The plan fixes status, headers and
//! the exact number of body bytes; [`Download::write_body`] later streams exactly
//! those bytes from the file.

use std::fs;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use http::StatusCode;
use mime::Mime;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::ensure;
use crate::protocol::{DownloadError, RangeSet, ResolvedRange, SendError, mime_table};

/// Whether the client should display the file or save it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// `inline` rather than `attachment` disposition.
    pub inline: bool,
    /// Honour the `Range` header; otherwise the whole file is always sent.
    pub accept_ranges: bool,
    /// Name announced to the client, the file name of the path by default.
    pub filename: Option<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self { inline: true, accept_ranges: true, filename: None }
    }
}

impl DownloadOptions {
    #[must_use]
    pub fn attachment(mut self) -> Self {
        self.inline = false;
        self
    }

    #[must_use]
    pub fn without_ranges(mut self) -> Self {
        self.accept_ranges = false;
        self
    }

    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// How the file is going to be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// `200`, the whole file.
    Full,
    /// `206`, one slice.
    Single(ResolvedRange),
    /// `206`, several slices framed as `multipart/x-byteranges`.
    Multipart { boundary: String, ranges: Vec<ResolvedRange> },
    /// `416`, nothing to send.
    Unsatisfiable,
}

/// A planned file transfer.
#[derive(Debug, Clone)]
pub struct Download {
    path: PathBuf,
    total: u64,
    mime: Mime,
    disposition: Disposition,
    filename: String,
    accept_ranges: bool,
    transfer: Transfer,
}

impl Download {
    /// Checks that `path` is a readable regular file and plans its transfer.
    ///
    /// `range` is the raw `Range` header of the request, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidArgument`] when `path` is missing, not a
    /// regular file or cannot be opened.
    pub fn prepare(path: impl AsRef<Path>, options: DownloadOptions, range: Option<&str>) -> Result<Self, DownloadError> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)
            .map_err(|e| DownloadError::invalid_argument(format!("{} is not accessible: {e}", path.display())))?;
        ensure!(metadata.is_file(), DownloadError::invalid_argument(format!("{} is not a regular file", path.display())));
        fs::File::open(path).map_err(|e| DownloadError::invalid_argument(format!("{} is not readable: {e}", path.display())))?;

        let total = metadata.len();
        let filename = options
            .filename
            .or_else(|| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_default();

        let transfer = match range {
            Some(range) if options.accept_ranges => plan(range, total),
            _ => Transfer::Full,
        };
        debug!(path = %path.display(), total, transfer = ?transfer, "planned download");

        Ok(Self {
            path: path.to_path_buf(),
            total,
            mime: mime_table::guess_from_path(path),
            disposition: if options.inline { Disposition::Inline } else { Disposition::Attachment },
            filename,
            accept_ranges: options.accept_ranges,
            transfer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the whole file when the download was planned.
    pub fn total_len(&self) -> u64 {
        self.total
    }

    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn accept_ranges(&self) -> bool {
        self.accept_ranges
    }

    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    pub fn status(&self) -> StatusCode {
        match self.transfer {
            Transfer::Full => StatusCode::OK,
            Transfer::Single(_) | Transfer::Multipart { .. } => StatusCode::PARTIAL_CONTENT,
            Transfer::Unsatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    /// Exact number of body bytes [`Download::write_body`] emits.
    pub fn content_length(&self) -> u64 {
        match &self.transfer {
            Transfer::Full => self.total,
            Transfer::Single(range) => range.len(),
            Transfer::Multipart { boundary, ranges } => {
                let parts: u64 = ranges.iter().map(|range| self.part_head(boundary, range).len() as u64 + range.len() + 2).sum();
                parts + closing_line(boundary).len() as u64
            }
            Transfer::Unsatisfiable => 0,
        }
    }

    pub fn content_type(&self) -> String {
        match &self.transfer {
            Transfer::Multipart { boundary, .. } => format!("multipart/x-byteranges; boundary={boundary}"),
            _ => self.mime.to_string(),
        }
    }

    pub fn content_range(&self) -> Option<String> {
        match &self.transfer {
            Transfer::Single(range) => Some(range.content_range(self.total)),
            Transfer::Unsatisfiable => Some(format!("*/{}", self.total)),
            Transfer::Full | Transfer::Multipart { .. } => None,
        }
    }

    /// `Content-Disposition` value; quotes and backslashes in the name are escaped.
    pub fn content_disposition(&self) -> String {
        let mut filename = String::with_capacity(self.filename.len());
        for c in self.filename.chars().filter(|c| !c.is_control()) {
            if c == '"' || c == '\\' {
                filename.push('\\');
            }
            filename.push(c);
        }
        format!("{}; filename=\"{}\"", self.disposition.as_str(), filename)
    }

    fn part_head(&self, boundary: &str, range: &ResolvedRange) -> String {
        format!(
            "--{boundary}\r\nContent-Type: {}\r\nContent-Range: {}\r\n\r\n",
            self.mime,
            range.content_range(self.total)
        )
    }

    /// Streams the planned body to `writer` and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Io`] on read or write failures and
    /// [`SendError::InvalidBody`] when the file got shorter since it was planned.
    pub async fn write_body<W>(&self, writer: &mut W) -> Result<u64, SendError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.transfer == Transfer::Unsatisfiable {
            return Ok(0);
        }

        let mut file = File::open(&self.path).await?;
        let written = match &self.transfer {
            Transfer::Full => copy_slice(&mut file, writer, 0, self.total).await?,
            Transfer::Single(range) => copy_slice(&mut file, writer, range.start, range.len()).await?,
            Transfer::Multipart { boundary, ranges } => {
                let mut written = 0;
                for range in ranges {
                    let head = self.part_head(boundary, range);
                    writer.write_all(head.as_bytes()).await?;
                    written += head.len() as u64;
                    written += copy_slice(&mut file, writer, range.start, range.len()).await?;
                    writer.write_all(b"\r\n").await?;
                    written += 2;
                }
                let closing = closing_line(boundary);
                writer.write_all(closing.as_bytes()).await?;
                written + closing.len() as u64
            }
            Transfer::Unsatisfiable => 0,
        };

        trace!(path = %self.path.display(), written, "wrote download body");
        Ok(written)
    }
}

/// Resolves a `Range` header against a file of `total` bytes.
fn plan(header: &str, total: u64) -> Transfer {
    let Some(set) = RangeSet::parse(header) else {
        debug!(range = header, "malformed range header");
        return Transfer::Unsatisfiable;
    };

    let mut ranges = set.satisfiable(total);
    match ranges.len() {
        0 => {
            debug!(range = header, total, "no satisfiable range");
            Transfer::Unsatisfiable
        }
        1 => Transfer::Single(ranges.remove(0)),
        _ => Transfer::Multipart { boundary: Uuid::new_v4().simple().to_string(), ranges },
    }
}

fn closing_line(boundary: &str) -> String {
    format!("--{boundary}--\r\n")
}

async fn copy_slice<W>(file: &mut File, writer: &mut W, start: u64, len: u64) -> Result<u64, SendError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    file.seek(SeekFrom::Start(start)).await?;
    let copied = tokio::io::copy(&mut file.take(len), writer).await?;
    ensure!(copied == len, SendError::invalid_body(format!("file shrank, expected {len} bytes from offset {start} but read {copied}")));
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn text_file(len: usize) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let content: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
        file.write_all(&content).unwrap();
        file
    }

    #[test]
    fn rejects_invalid_paths() {
        let dir = tempfile::tempdir().unwrap();

        let missing = Download::prepare(dir.path().join("nope.txt"), DownloadOptions::default(), None);
        assert!(matches!(missing, Err(DownloadError::InvalidArgument { .. })));

        let directory = Download::prepare(dir.path(), DownloadOptions::default(), None);
        assert!(matches!(directory, Err(DownloadError::InvalidArgument { .. })));
    }

    #[test]
    fn full_transfer_without_range() {
        let file = text_file(1000);
        let download = Download::prepare(file.path(), DownloadOptions::default(), None).unwrap();

        assert_eq!(download.transfer(), &Transfer::Full);
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(download.content_length(), 1000);
        assert_eq!(download.content_type(), "text/plain");
        assert_eq!(download.content_range(), None);
    }

    #[test]
    fn ranges_ignored_when_disabled() {
        let file = text_file(1000);
        let download = Download::prepare(file.path(), DownloadOptions::default().without_ranges(), Some("bytes=0-1")).unwrap();

        assert_eq!(download.transfer(), &Transfer::Full);
        assert!(!download.accept_ranges());
    }

    #[test]
    fn unsatisfiable_headers() {
        let file = text_file(1000);
        for header in ["xx", "x", "bytes=", "bytes=-", "bytes=a-", "bytes=0-y", "bytes=0-10000", "items=0-1", "bytes=1000-"] {
            let download = Download::prepare(file.path(), DownloadOptions::default(), Some(header)).unwrap();

            assert_eq!(download.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{header}");
            assert_eq!(download.content_range().as_deref(), Some("*/1000"), "{header}");
            assert_eq!(download.content_length(), 0, "{header}");
        }
    }

    #[test]
    fn single_range() {
        let file = text_file(1000);
        let download = Download::prepare(file.path(), DownloadOptions::default(), Some("bytes=0-499")).unwrap();

        assert_eq!(download.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(download.content_length(), 500);
        assert_eq!(download.content_range().as_deref(), Some("bytes 0-499/1000"));
        assert_eq!(download.content_type(), "text/plain");
    }

    #[test]
    fn unsatisfiable_entries_are_dropped() {
        let file = text_file(1000);
        let download = Download::prepare(file.path(), DownloadOptions::default(), Some("bytes=0-10000,-98")).unwrap();

        assert_eq!(download.transfer(), &Transfer::Single(ResolvedRange { start: 902, end: 999 }));
    }

    #[test]
    fn multipart_length_is_exact() {
        let file = text_file(1000);
        let download = Download::prepare(file.path(), DownloadOptions::default(), Some("bytes=0-499,500-549")).unwrap();

        let Transfer::Multipart { boundary, ranges } = download.transfer() else {
            panic!("expected multipart transfer");
        };
        assert_eq!(boundary.len(), 32);
        assert_eq!(ranges.len(), 2);
        assert_eq!(download.content_type(), format!("multipart/x-byteranges; boundary={boundary}"));
        // 599 + 151 for the parts, 38 for the closing line
        assert_eq!(download.content_length(), 788);
    }

    #[test]
    fn boundaries_are_fresh() {
        let file = text_file(100);
        let first = Download::prepare(file.path(), DownloadOptions::default(), Some("bytes=0-1,3-4")).unwrap();
        let second = Download::prepare(file.path(), DownloadOptions::default(), Some("bytes=0-1,3-4")).unwrap();

        assert_ne!(first.content_type(), second.content_type());
    }

    #[test]
    fn disposition() {
        let file = text_file(10);
        let inline = Download::prepare(file.path(), DownloadOptions::default().filename("report \"q1\".txt"), None).unwrap();
        assert_eq!(inline.content_disposition(), r#"inline; filename="report \"q1\".txt""#);

        let attachment = Download::prepare(file.path(), DownloadOptions::default().attachment().filename("a\r\nb.txt"), None).unwrap();
        assert_eq!(attachment.disposition(), Disposition::Attachment);
        assert_eq!(attachment.content_disposition(), r#"attachment; filename="ab.txt""#);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn writes_multipart_body() {
        let file = text_file(100);
        let download = Download::prepare(file.path(), DownloadOptions::default(), Some("bytes=0-2,-3")).unwrap();
        let Transfer::Multipart { boundary, .. } = download.transfer().clone() else {
            panic!("expected multipart transfer");
        };

        let mut out = Vec::new();
        let written = download.write_body(&mut out).await.unwrap();

        let expected = format!(
            "--{boundary}\r\nContent-Type: text/plain\r\nContent-Range: bytes 0-2/100\r\n\r\nabc\r\n\
             --{boundary}\r\nContent-Type: text/plain\r\nContent-Range: bytes 97-99/100\r\n\r\ntuv\r\n\
             --{boundary}--\r\n"
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
        assert_eq!(written, download.content_length());
        assert_eq!(written, expected.len() as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn detects_shrunk_file() {
        let file = text_file(100);
        let download = Download::prepare(file.path(), DownloadOptions::default(), Some("bytes=50-99")).unwrap();
        file.as_file().set_len(60).unwrap();

        let mut out = Vec::new();
        let result = download.write_body(&mut out).await;
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }
}
