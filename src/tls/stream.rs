//! Driving the TLS engine over a byte stream.

use std::io::{Read, Write};

use rustls::{ClientConnection, ServerConnection};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::io::ByteStream;

const TLS_CHUNK: usize = 16 * 1024;

/// One session, client or server flavor.
pub(crate) enum Session {
    Client(ClientConnection),
    Server(ServerConnection),
}

impl From<ClientConnection> for Session {
    fn from(c: ClientConnection) -> Self {
        Self::Client(c)
    }
}

impl From<ServerConnection> for Session {
    fn from(s: ServerConnection) -> Self {
        Self::Server(s)
    }
}

/// A TLS session over any [`ByteStream`].
///
/// Exposes the same partial read/write surface as the plain socket, so
/// the byte-stream adapters stack on top unchanged.
pub struct TlsStream<S: ByteStream> {
    stream: S,
    session: Session,
}

impl<S: ByteStream> TlsStream<S> {
    pub(crate) fn new(stream: S, session: Session) -> Self {
        Self { stream, session }
    }

    /// Consumes the adapter, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Flushes one chunk of pending ciphertext to the stream; returns
    /// the number of ciphertext bytes moved.
    async fn flush_output(&mut self) -> Result<usize> {
        let mut out = Vec::with_capacity(TLS_CHUNK);
        self.write_tls(&mut out)?;
        let mut sent = 0;
        while sent < out.len() {
            let n = self.stream.write_some(&out[sent..]).await?;
            if n == 0 {
                return Err(Error::Tls("connection closed while flushing".into()));
            }
            sent += n;
        }
        Ok(sent)
    }

    /// Feeds one socket read into the engine; 0 means raw EOF.
    async fn feed_input(&mut self) -> Result<usize> {
        let mut buf = [0u8; TLS_CHUNK];
        let n = self.stream.read_some(&mut buf).await?;
        if n == 0 {
            return Ok(0);
        }
        let mut slice = &buf[..n];
        self.read_tls(&mut slice)?;
        Ok(n)
    }

    fn process(&mut self) -> Result<()> {
        let result = match &mut self.session {
            Session::Client(c) => c.process_new_packets(),
            Session::Server(s) => s.process_new_packets(),
        };
        result.map(|_| ()).map_err(|e| Error::Tls(e.to_string()))
    }

    fn wants_write(&self) -> bool {
        match &self.session {
            Session::Client(c) => c.wants_write(),
            Session::Server(s) => s.wants_write(),
        }
    }

    fn is_handshaking(&self) -> bool {
        match &self.session {
            Session::Client(c) => c.is_handshaking(),
            Session::Server(s) => s.is_handshaking(),
        }
    }

    fn read_tls(&mut self, input: &mut &[u8]) -> Result<usize> {
        let result = match &mut self.session {
            Session::Client(c) => c.read_tls(input),
            Session::Server(s) => s.read_tls(input),
        };
        result.map_err(|e| Error::Tls(e.to_string()))
    }

    fn write_tls(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let result = match &mut self.session {
            Session::Client(c) => c.write_tls(out),
            Session::Server(s) => s.write_tls(out),
        };
        result.map_err(|e| Error::Tls(e.to_string()))
    }

    fn read_plaintext(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.session {
            Session::Client(c) => c.reader().read(buf),
            Session::Server(s) => s.reader().read(buf),
        }
    }

    fn write_plaintext(&mut self, buf: &[u8]) -> Result<usize> {
        let result = match &mut self.session {
            Session::Client(c) => c.writer().write(buf),
            Session::Server(s) => s.writer().write(buf),
        };
        result.map_err(|e| Error::Tls(e.to_string()))
    }

    /// Runs the handshake to completion: flush what the engine wants to
    /// send, feed it what it wants to read, stop when it reports done.
    pub(crate) async fn complete_handshake(&mut self) -> Result<()> {
        loop {
            self.process()?;
            while self.wants_write() {
                self.flush_output().await?;
            }
            if !self.is_handshaking() {
                debug!("tls handshake complete");
                return Ok(());
            }
            let n = self.feed_input().await?;
            if n == 0 {
                return Err(Error::Tls("connection closed during handshake".into()));
            }
        }
    }

    /// Reads decrypted bytes; 0 at end of stream.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.read_plaintext(buf) {
                // Plaintext was available; 0 is the peer's close_notify.
                Ok(n) => {
                    trace!(bytes = n, "tls read");
                    return Ok(n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(0),
                Err(e) => return Err(Error::Tls(e.to_string())),
            }

            let n = self.feed_input().await?;
            if n == 0 {
                return Ok(0);
            }
            self.process()?;
            while self.wants_write() {
                self.flush_output().await?;
            }
        }
    }

    /// Encrypts `buf` and flushes the ciphertext; returns `buf.len()`.
    pub async fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.write_plaintext(buf)?;
        trace!(bytes = n, "tls write");
        while self.wants_write() {
            self.flush_output().await?;
        }
        Ok(n)
    }
}

impl<S: ByteStream> ByteStream for TlsStream<S> {
    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        TlsStream::read_some(self, buf).await
    }

    async fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        TlsStream::write_some(self, buf).await
    }
}

impl<S: ByteStream> std::fmt::Debug for TlsStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.session {
            Session::Client(_) => "client",
            Session::Server(_) => "server",
        };
        f.debug_struct("TlsStream")
            .field("session", &kind)
            .field("handshaking", &self.is_handshaking())
            .finish_non_exhaustive()
    }
}
