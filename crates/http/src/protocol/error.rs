use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("header error: {source}")]
    HeaderError {
        #[from]
        source: HeaderError,
    },

    #[error("download error: {source}")]
    DownloadError {
        #[from]
        source: DownloadError,
    },

    #[error("config error: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },
}

/// Raised while building exchange configuration such as the trusted proxy list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid trusted proxy entry {entry:?}: {reason}")]
    InvalidProxy { entry: String, reason: String },
}

impl ConfigError {
    pub fn invalid_proxy<E: ToString, R: ToString>(entry: E, reason: R) -> Self {
        Self::InvalidProxy { entry: entry.to_string(), reason: reason.to_string() }
    }
}

/// Raised when application code or a decoder tries to store a header that could
/// split the message (CR, LF, NUL or other control bytes) or has an illegal name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid header name: {name:?}")]
    InvalidName { name: String },

    #[error("invalid value for header {name:?}")]
    InvalidValue { name: String },
}

impl HeaderError {
    pub fn invalid_name<S: ToString>(name: S) -> Self {
        Self::InvalidName { name: name.to_string() }
    }

    pub fn invalid_value<S: ToString>(name: S) -> Self {
        Self::InvalidValue { name: name.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("unsupported protocol version: {version}")]
    UnsupportedVersion { version: String },

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid json body: {source}")]
    InvalidJson {
        #[from]
        source: serde_json::Error,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn unsupported_version<S: ToString>(version: S) -> Self {
        Self::UnsupportedVersion { version: version.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }
}

impl From<HeaderError> for ParseError {
    fn from(e: HeaderError) -> Self {
        Self::invalid_header(e)
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid status code: {code}")]
    InvalidStatus { code: u16 },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_status(code: u16) -> Self {
        Self::InvalidStatus { code }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }
}

/// Errors raised while configuring a file download, before any response state is touched.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("invalid download target: {reason}")]
    InvalidArgument { reason: String },
}

impl DownloadError {
    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }
}
