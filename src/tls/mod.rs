//! TLS over the runtime's sockets.
//!
//! rustls is the crate's opaque TLS engine: its session object buffers
//! ciphertext in and out through `read_tls`/`write_tls` and exposes
//! plaintext through `reader()`/`writer()`, which is exactly the
//! memory-BIO shape [`TlsStream`] drives over a [`ByteStream`]. Engine
//! failures surface as [`Error::Tls`](crate::Error::Tls) with the
//! engine's description.

mod config;
mod stream;

pub use config::{TlsAcceptor, TlsConnector};
pub use stream::TlsStream;
