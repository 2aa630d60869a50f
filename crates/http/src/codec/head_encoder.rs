//! Response head encoder: status line and header lines into raw bytes.
//!
//! Every value stored in the [`HeaderBag`](crate::protocol::HeaderBag) becomes its own
//! header line, so repeated headers such as `Set-Cookie` are never folded.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{ResponseHead, SendError, version_str};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for response heads implementing the [`Encoder`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadEncoder;

impl Encoder<ResponseHead<'_>> for HeadEncoder {
    type Error = SendError;

    fn encode(&mut self, head: ResponseHead<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {} {}\r\n", version_str(head.version), head.status.as_str(), head.reason)?;

        for (name, value) in head.headers.iter() {
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Writes straight into the reserved `BytesMut`.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
