//! Wire codecs for the exchange model.
//!
//! - [`HeadDecoder`]: raw request head bytes into a [`RequestHead`](crate::protocol::RequestHead)
//! - [`HeadEncoder`]: a [`ResponseHead`](crate::protocol::ResponseHead) into status line and header lines
//!
//! Bodies are not framed here: requests carry their body as plain bytes and responses
//! stream theirs in [`Response::send`](crate::protocol::Response::send).
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_exchange::codec::HeadDecoder;
//! use tokio_util::codec::Decoder;
//!
//! let mut buf = BytesMut::from("GET /a?b=1 HTTP/1.1\r\nHost: example.com\r\n\r\n");
//! let head = HeadDecoder.decode(&mut buf).unwrap().unwrap();
//! assert_eq!(head.uri.path(), "/a");
//! assert_eq!(head.headers.get("host"), Some("example.com"));
//! ```

mod head_decoder;
mod head_encoder;

pub use head_decoder::{HeadDecoder, body_length};
pub use head_encoder::HeadEncoder;
