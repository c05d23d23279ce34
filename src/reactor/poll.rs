//! `poll(2)` readiness backend.
//!
//! Same rebuild-per-call model as [`select`](super::select) but without
//! the `FD_SETSIZE` ceiling. `POLLERR`/`POLLHUP`/`POLLNVAL` wake both
//! directions so the owning task surfaces the failure from its next
//! syscall.

use std::cell::RefCell;
use std::io;
use std::time::Duration;

use super::registry::{registry_poller_methods, Registry};
use super::{Direction, Poller};

/// Readiness poller backed by `poll(2)`.
#[derive(Debug, Default)]
pub struct PollPoller {
    registry: RefCell<Registry>,
}

impl PollPoller {
    /// Creates the poller; infallible, kept uniform with the other
    /// backends.
    pub fn new() -> io::Result<Self> {
        Ok(Self::default())
    }
}

impl Poller for PollPoller {
    registry_poller_methods!();

    fn poll(&self, max_wait: Duration) -> io::Result<()> {
        let mut fds: Vec<libc::pollfd> = {
            let registry = self.registry.borrow();
            registry
                .slots()
                .map(|(fd, read, write)| {
                    let mut events: libc::c_short = 0;
                    if read {
                        events |= libc::POLLIN;
                    }
                    if write {
                        events |= libc::POLLOUT;
                    }
                    libc::pollfd {
                        fd,
                        events,
                        revents: 0,
                    }
                })
                .collect()
        };

        // Round up so a sub-millisecond budget still blocks instead of
        // spinning; drain_expired re-checks the clock afterwards.
        let millis = max_wait
            .as_nanos()
            .div_ceil(1_000_000)
            .min(i32::MAX as u128) as i32;

        // SAFETY: `fds` is a valid pollfd array for the duration of the
        // call.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        if rc > 0 {
            let mut registry = self.registry.borrow_mut();
            for pfd in &fds {
                if pfd.revents == 0 {
                    continue;
                }
                if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                    registry.wake_error(pfd.fd);
                    continue;
                }
                if pfd.revents & libc::POLLIN != 0 {
                    registry.wake_ready(pfd.fd, Direction::Read);
                }
                if pfd.revents & libc::POLLOUT != 0 {
                    registry.wake_ready(pfd.fd, Direction::Write);
                }
            }
        }
        Ok(())
    }
}
