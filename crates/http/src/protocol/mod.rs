//! The HTTP exchange model.
//!
//! - **Headers** ([`header`]): [`HeaderBag`], case-insensitive and order-preserving
//! - **Messages** ([`message`]): [`Message`], version, headers and body shared by both sides
//! - **Requests** ([`request`]): [`Request`] with proxy-aware host, scheme, port and
//!   client address resolution, content negotiation and body decoding
//! - **Trust** ([`trust`]): [`TrustPolicy`] and the stock [`TrustedProxies`] list
//! - **Ranges** ([`range`]) and **downloads** ([`download`]): `Range` parsing and the
//!   planned transfer of a file as full, partial or multipart content
//! - **Responses** ([`response`]): [`Response`], status line management and one-shot sending
//! - **Uploads** ([`upload`]): [`UploadedFile`] descriptors handed over by the transport
//! - **Errors** ([`error`]): [`HttpError`] and the per-concern error enums

pub mod download;
pub mod error;
pub mod header;
pub mod message;
pub mod mime_table;
pub mod negotiation;
pub mod range;
pub mod request;
pub mod response;
pub mod trust;
pub mod upload;

pub use download::{Disposition, Download, DownloadOptions, Transfer};
pub use error::{ConfigError, DownloadError, HeaderError, HttpError, ParseError, SendError};
pub use header::HeaderBag;
pub use message::{Message, ProtocolVersion, SUPPORTED_VERSIONS, parse_version, version_str};
pub use negotiation::QualityItem;
pub use range::{ByteRange, RangeSet, ResolvedRange};
pub use request::{ConnectionInfo, Request, RequestBuilder, RequestHead};
pub use response::{Pending, Response, ResponseHead, Sent, State};
pub use trust::{Peer, TrustPolicy, TrustedProxies};
pub use upload::{UploadError, UploadedFile};

#[cfg(test)]
pub(crate) use trust::MockTrustPolicy;
