//! The readiness-wait future shared by every socket operation.

use std::future::Future;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::reactor::{Direction, Poller};

/// Waits until `(fd, dir)` is ready or `deadline` passes.
///
/// Arms the interest on first poll. A task-level wake with the interest
/// still armed (some other future in the same task fired) keeps waiting;
/// once the slot has been consumed, the wait resolves — to `TimedOut`
/// when the deadline has passed, `Ok` otherwise. Dropping the future
/// mid-wait unregisters the interest, which is how cancellation reaches
/// the reactor.
pub(crate) struct Readiness<'a, P: Poller> {
    poller: &'a P,
    fd: RawFd,
    dir: Direction,
    deadline: Option<Instant>,
    armed: bool,
}

impl<'a, P: Poller> Readiness<'a, P> {
    pub(crate) fn new(poller: &'a P, fd: RawFd, dir: Direction, deadline: Option<Instant>) -> Self {
        Self {
            poller,
            fd,
            dir,
            deadline,
            armed: false,
        }
    }
}

impl<P: Poller> Future for Readiness<'_, P> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.armed {
            if this.poller.is_registered(this.fd, this.dir) {
                return Poll::Pending;
            }
            this.armed = false;
            if this.deadline.is_some_and(|d| Instant::now() >= d) {
                return Poll::Ready(Err(Error::TimedOut));
            }
            return Poll::Ready(Ok(()));
        }
        if this.deadline.is_some_and(|d| Instant::now() >= d) {
            return Poll::Ready(Err(Error::TimedOut));
        }
        this.poller
            .register(this.fd, this.dir, cx.waker(), this.deadline);
        this.armed = true;
        Poll::Pending
    }
}

impl<P: Poller> Drop for Readiness<'_, P> {
    fn drop(&mut self) {
        if self.armed {
            self.poller.unregister(self.fd, self.dir);
        }
    }
}
