//! Non-blocking UDP socket, the resolver's transport.

use std::net::{self, SocketAddr};
use std::os::fd::AsRawFd;
use std::rc::Rc;
use std::time::Instant;

use socket2::{Domain, Socket, Type};

use super::ready::Readiness;
use crate::error::Result;
use crate::reactor::{Direction, Poller};

/// A UDP socket bound to a local address.
pub struct UdpSocket<P: Poller> {
    poller: Rc<P>,
    socket: net::UdpSocket,
}

impl<P: Poller> UdpSocket<P> {
    /// Binds a non-blocking UDP socket to `addr`.
    pub fn bind(poller: &Rc<P>, addr: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, None)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        Ok(Self {
            poller: Rc::clone(poller),
            socket: socket.into(),
        })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends one datagram to `target`.
    pub async fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
        deadline: Option<Instant>,
    ) -> Result<usize> {
        let fd = self.socket.as_raw_fd();
        loop {
            Readiness::new(&*self.poller, fd, Direction::Write, deadline).await?;
            match self.socket.send_to(buf, target) {
                Ok(n) => return Ok(n),
                Err(e) if super::retryable(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Receives one datagram.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        deadline: Option<Instant>,
    ) -> Result<(usize, SocketAddr)> {
        let fd = self.socket.as_raw_fd();
        loop {
            Readiness::new(&*self.poller, fd, Direction::Read, deadline).await?;
            match self.socket.recv_from(buf) {
                Ok(pair) => return Ok(pair),
                Err(e) if super::retryable(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<P: Poller> Drop for UdpSocket<P> {
    fn drop(&mut self) {
        self.poller.unregister_fd(self.socket.as_raw_fd());
    }
}

impl<P: Poller> std::fmt::Debug for UdpSocket<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpSocket")
            .field("local", &self.socket.local_addr().ok())
            .finish_non_exhaustive()
    }
}
