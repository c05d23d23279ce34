//! Byte-stream adapters layered on the socket contract.
//!
//! Everything here is generic over [`ByteStream`], so the same adapters
//! run over plain TCP and TLS sockets.

mod line;
mod line_reader;
mod reader;
mod writer;

pub use line::{Line, LineSplitter, ZeroCopyLineSplitter};
pub use line_reader::LineReader;
pub use reader::{ByteReader, Record, StructReader};
pub use writer::ByteWriter;

use crate::error::Result;

/// The minimal stream contract: one partial read, one partial write.
///
/// `read_some` returns 0 exactly when the peer closed; short reads and
/// writes are normal. Implemented by [`TcpStream`](crate::net::TcpStream)
/// and [`TlsStream`](crate::tls::TlsStream).
pub trait ByteStream {
    /// Reads at most `buf.len()` bytes; 0 means end of stream.
    fn read_some(&mut self, buf: &mut [u8]) -> impl std::future::Future<Output = Result<usize>>;

    /// Writes at most `buf.len()` bytes.
    fn write_some(&mut self, buf: &[u8]) -> impl std::future::Future<Output = Result<usize>>;
}
