//! A transport-independent HTTP exchange model
//!
//! This crate models one HTTP request/response exchange as in-memory values and
//! implements the two parts of it that need precise, security relevant handling:
//! resolving the client's real host, scheme, port and address behind forwarding
//! proxies, and serving byte-range (`206 Partial Content`) downloads with exact
//! `multipart/x-byteranges` bodies.
//!
//! # Features
//!
//! - Case-insensitive, order-preserving headers with header-injection checks
//! - Proxy trust through a pluggable [`protocol::TrustPolicy`]
//! - Lazily computed, memoized request facts (host, scheme, port, URL, JSON body)
//! - `Accept*` negotiation and typed body decoding via serde
//! - RFC 7233 range handling with single-part and multipart responses
//! - One-shot response transmission enforced by the type system
//!
//! # Example
//!
//! ```no_run
//! use bytes::BytesMut;
//! use micro_exchange::codec::HeadDecoder;
//! use micro_exchange::protocol::{DownloadOptions, Request, Response, TrustedProxies};
//! use tokio_util::codec::Decoder;
//!
//! # async fn serve() -> Result<(), Box<dyn std::error::Error>> {
//! let mut buf = BytesMut::from("GET /report.pdf HTTP/1.1\r\nHost: example.com\r\nRange: bytes=0-1023\r\n\r\n");
//! let head = HeadDecoder.decode(&mut buf)?.ok_or("incomplete head")?;
//!
//! let request = Request::builder()
//!     .head(head)
//!     .remote_addr("10.0.0.7".parse()?)
//!     .trusted_proxies(TrustedProxies::new(["10.0.0.0/8"])?)
//!     .build()?;
//!
//! let mut response = Response::for_request(&request);
//! response.set_download("/srv/files/report.pdf", DownloadOptions::default().attachment())?;
//!
//! let mut stdout = tokio::io::stdout();
//! let sent = response.send(&mut stdout).await?;
//! assert!(sent.is_sent());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: the exchange model, negotiation, ranges and errors
//! - [`codec`]: request head decoding and response head encoding
//!
//! # Limitations
//!
//! - Only HTTP/1.x heads are decoded; chunked request bodies are not
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
