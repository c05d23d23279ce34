//! Non-blocking TCP sockets driven by the poller.
//!
//! Every operation is deadline-capable: the `*_deadline` entry points
//! take an absolute [`Instant`] and resolve to [`Error::TimedOut`] once
//! it passes without progress, with the underlying interest already
//! unregistered. The plain entry points wait indefinitely.

use std::cell::Cell;
use std::io::{Read, Write};
use std::net::{self, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::Instant;

use socket2::{Domain, Socket, Type};
use tracing::debug;

use super::ready::Readiness;
use super::retryable;
use crate::combinator::yield_now;
use crate::error::{Error, Result};
use crate::io::ByteStream;
use crate::reactor::{Direction, Poller};

/// Lifecycle of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Connect issued, completion pending.
    Connecting,
    /// Ready for I/O.
    Connected,
    /// Bound and accepting.
    Listening,
    /// Closed; the fd has been returned to the OS.
    Closed,
}

/// A listening TCP socket.
pub struct TcpListener<P: Poller> {
    poller: Rc<P>,
    listener: Option<net::TcpListener>,
}

impl<P: Poller> TcpListener<P> {
    /// Binds `addr` and starts listening.
    pub fn bind(poller: &Rc<P>, addr: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        debug!(%addr, "listening");
        Ok(Self {
            poller: Rc::clone(poller),
            listener: Some(socket.into()),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SocketState {
        if self.listener.is_some() {
            SocketState::Listening
        } else {
            SocketState::Closed
        }
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let listener = self.listener.as_ref().ok_or(Error::Closed)?;
        Ok(listener.local_addr()?)
    }

    /// Accepts one connection.
    pub async fn accept(&self) -> Result<TcpStream<P>> {
        self.accept_deadline(None).await
    }

    /// Accepts one connection, failing with [`Error::TimedOut`] at
    /// `deadline`.
    pub async fn accept_deadline(&self, deadline: Option<Instant>) -> Result<TcpStream<P>> {
        let listener = self.listener.as_ref().ok_or(Error::Closed)?;
        let fd = listener.as_raw_fd();
        loop {
            Readiness::new(&*self.poller, fd, Direction::Read, deadline).await?;
            match listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(true)?;
                    debug!(%peer, "accepted");
                    return Ok(TcpStream::from_parts(
                        Rc::clone(&self.poller),
                        stream,
                        Some(peer),
                    ));
                }
                Err(e) if retryable(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Stops listening and returns the fd to the OS. Idempotent.
    pub fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.poller.unregister_fd(listener.as_raw_fd());
        }
    }
}

impl<P: Poller> Drop for TcpListener<P> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<P: Poller> std::fmt::Debug for TcpListener<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpListener")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A connected (or connecting) TCP stream. Move-only owner of its fd;
/// dropping it closes the fd exactly once.
pub struct TcpStream<P: Poller> {
    poller: Rc<P>,
    stream: Option<net::TcpStream>,
    state: Cell<SocketState>,
    peer: Option<SocketAddr>,
}

impl<P: Poller> TcpStream<P> {
    /// Connects to `addr`, waiting as long as it takes.
    pub async fn connect(poller: &Rc<P>, addr: SocketAddr) -> Result<Self> {
        Self::connect_deadline(poller, addr, None).await
    }

    /// Connects to `addr`, failing with [`Error::TimedOut`] at `deadline`.
    ///
    /// A non-blocking connect reports completion as writability; the
    /// pending OS error (`ECONNREFUSED`, `EHOSTUNREACH`, ...) is read
    /// back with `SO_ERROR` once the socket wakes.
    pub async fn connect_deadline(
        poller: &Rc<P>,
        addr: SocketAddr,
        deadline: Option<Instant>,
    ) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_nonblocking(true)?;

        let pending = match socket.connect(&addr.into()) {
            Ok(()) => false,
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => true,
            Err(e) => return Err(e.into()),
        };

        let this = Self {
            poller: Rc::clone(poller),
            stream: Some(socket.into()),
            state: Cell::new(SocketState::Connecting),
            peer: Some(addr),
        };

        if pending {
            let fd = this.fd()?;
            Readiness::new(&**poller, fd, Direction::Write, deadline).await?;
            if let Some(err) = this.stream.as_ref().and_then(|s| s.take_error().ok().flatten()) {
                return Err(err.into());
            }
        }
        this.state.set(SocketState::Connected);
        debug!(%addr, "connected");
        Ok(this)
    }

    pub(crate) fn from_parts(
        poller: Rc<P>,
        stream: net::TcpStream,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            poller,
            stream: Some(stream),
            state: Cell::new(SocketState::Connected),
            peer,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.state.get()
    }

    /// The peer's address, once known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// The local address of the socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let stream = self.stream.as_ref().ok_or(Error::Closed)?;
        Ok(stream.local_addr()?)
    }

    fn fd(&self) -> Result<RawFd> {
        self.stream
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(Error::Closed)
    }

    fn connected(&self) -> Result<&net::TcpStream> {
        if self.state.get() != SocketState::Connected {
            return Err(Error::Closed);
        }
        self.stream.as_ref().ok_or(Error::Closed)
    }

    /// Reads at most `buf.len()` bytes; 0 means the peer closed.
    pub async fn read_some(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_some_deadline(buf, None).await
    }

    /// [`read_some`](Self::read_some) with a deadline.
    pub async fn read_some_deadline(
        &self,
        buf: &mut [u8],
        deadline: Option<Instant>,
    ) -> Result<usize> {
        let stream = self.connected()?;
        let fd = stream.as_raw_fd();
        loop {
            Readiness::new(&*self.poller, fd, Direction::Read, deadline).await?;
            let mut reader: &net::TcpStream = stream;
            match reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if retryable(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// [`read_some`](Self::read_some), but yields to the run queue first
    /// even when the fd is already readable. Breaks resumption monopolies
    /// in tight same-process loopbacks.
    pub async fn read_some_yield(&self, buf: &mut [u8]) -> Result<usize> {
        yield_now().await;
        self.read_some_deadline(buf, None).await
    }

    /// Writes at most `buf.len()` bytes; short writes are not errors.
    pub async fn write_some(&self, buf: &[u8]) -> Result<usize> {
        self.write_some_deadline(buf, None).await
    }

    /// [`write_some`](Self::write_some) with a deadline.
    pub async fn write_some_deadline(
        &self,
        buf: &[u8],
        deadline: Option<Instant>,
    ) -> Result<usize> {
        let stream = self.connected()?;
        let fd = stream.as_raw_fd();
        loop {
            Readiness::new(&*self.poller, fd, Direction::Write, deadline).await?;
            let mut writer: &net::TcpStream = stream;
            match writer.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if retryable(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// [`write_some`](Self::write_some), yielding once before arming the
    /// interest.
    pub async fn write_some_yield(&self, buf: &[u8]) -> Result<usize> {
        yield_now().await;
        self.write_some_deadline(buf, None).await
    }

    /// Completes when the peer closes or resets the connection.
    ///
    /// Probes with `MSG_PEEK`, so it never consumes bytes a concurrent
    /// read path is waiting for.
    pub async fn monitor(&self) -> Result<()> {
        let stream = self.connected()?;
        let fd = stream.as_raw_fd();
        let mut probe = [0u8; 1];
        loop {
            Readiness::new(&*self.poller, fd, Direction::Read, None).await?;
            match stream.peek(&mut probe) {
                Ok(0) => return Ok(()),
                Ok(_) => yield_now().await,
                Err(e) if retryable(&e) => {}
                Err(_) => return Ok(()),
            }
        }
    }

    /// Closes the socket. Idempotent; pending interests are unregistered
    /// and the fd is returned to the OS exactly once.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.poller.unregister_fd(stream.as_raw_fd());
        }
        self.state.set(SocketState::Closed);
    }
}

impl<P: Poller> Drop for TcpStream<P> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<P: Poller> ByteStream for TcpStream<P> {
    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        TcpStream::read_some(self, buf).await
    }

    async fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        TcpStream::write_some(self, buf).await
    }
}

/// Shared-reference streams let a reader adapter and a writer adapter
/// coexist on one socket (the operations themselves only need `&self`).
impl<P: Poller> ByteStream for &TcpStream<P> {
    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        TcpStream::read_some(*self, buf).await
    }

    async fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        TcpStream::write_some(*self, buf).await
    }
}

impl<P: Poller> std::fmt::Debug for TcpStream<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpStream")
            .field("state", &self.state.get())
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

