use std::str::FromStr;

use bytes::Bytes;
use http::Version;

use crate::protocol::{HeaderBag, HeaderError, ParseError};

/// Protocol versions a [`Message`] may carry.
pub const SUPPORTED_VERSIONS: [Version; 4] = [Version::HTTP_10, Version::HTTP_11, Version::HTTP_2, Version::HTTP_3];

/// The parts shared by requests and responses: protocol version, headers and body.
///
/// Setting the body never touches `Content-Length`; the response engine fills that in
/// when the message is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    version: Version,
    headers: HeaderBag,
    body: Bytes,
}

impl Default for Message {
    fn default() -> Self {
        Self { version: Version::HTTP_11, headers: HeaderBag::new(), body: Bytes::new() }
    }
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a message, failing if `version` is outside [`SUPPORTED_VERSIONS`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnsupportedVersion`] for `HTTP/0.9` and unknown versions.
    pub fn with_parts(version: Version, headers: HeaderBag, body: Bytes) -> Result<Self, ParseError> {
        let mut message = Self { headers, body, ..Self::default() };
        message.set_version(version)?;
        Ok(message)
    }

    /// An empty message carrying the same version as `other`.
    pub fn reply_to(other: &Self) -> Self {
        Self { version: other.version, ..Self::default() }
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// # Errors
    ///
    /// Returns [`ParseError::UnsupportedVersion`] for versions outside [`SUPPORTED_VERSIONS`].
    pub fn set_version(&mut self, version: Version) -> Result<(), ParseError> {
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ParseError::unsupported_version(format!("{version:?}")));
        }
        self.version = version;
        Ok(())
    }

    #[inline]
    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderBag {
        &mut self.headers
    }

    /// Shorthand for `headers().get(name)`.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Shorthand for `headers_mut().set(name, value)`.
    ///
    /// # Errors
    ///
    /// See [`HeaderBag::set`].
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        self.headers.set(name, value)
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    pub fn take_body(&mut self) -> Bytes {
        std::mem::take(&mut self.body)
    }
}

/// Parses a protocol version as written on a request line or in server variables.
///
/// Both `HTTP/1.1` and the bare `1.1` forms are accepted.
///
/// # Errors
///
/// Returns [`ParseError::UnsupportedVersion`] when the text names no supported version.
pub fn parse_version(s: &str) -> Result<Version, ParseError> {
    let trimmed = s.trim();
    let number = trimmed.strip_prefix("HTTP/").unwrap_or(trimmed);
    match number {
        "1.0" => Ok(Version::HTTP_10),
        "1.1" => Ok(Version::HTTP_11),
        "2" | "2.0" => Ok(Version::HTTP_2),
        "3" | "3.0" => Ok(Version::HTTP_3),
        _ => Err(ParseError::unsupported_version(trimmed)),
    }
}

/// Returns the wire form of `version`, e.g. `HTTP/1.1`.
pub fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    }
}

/// Newtype so versions can be read with `str::parse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion(pub Version);

impl FromStr for ProtocolVersion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version(s).map(ProtocolVersion)
    }
}

impl From<ProtocolVersion> for Version {
    fn from(value: ProtocolVersion) -> Self {
        value.0
    }
}
