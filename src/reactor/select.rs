//! `select(2)` readiness backend.
//!
//! The portable baseline: rebuilds the fd sets from the interest table on
//! every call, so a poll costs O(#registered). Limited to fds below
//! `FD_SETSIZE`.

use std::cell::RefCell;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use super::registry::{registry_poller_methods, Registry};
use super::{Direction, Poller};

/// Readiness poller backed by `select(2)`.
#[derive(Debug, Default)]
pub struct SelectPoller {
    registry: RefCell<Registry>,
}

impl SelectPoller {
    /// Creates the poller. `select` needs no kernel object, so this cannot
    /// fail; the `Result` keeps the constructor uniform across backends.
    pub fn new() -> io::Result<Self> {
        Ok(Self::default())
    }
}

impl Poller for SelectPoller {
    registry_poller_methods!();

    fn poll(&self, max_wait: Duration) -> io::Result<()> {
        // SAFETY: an all-zero fd_set is the valid empty set.
        let mut read_set: libc::fd_set = unsafe { mem::zeroed() };
        let mut write_set: libc::fd_set = unsafe { mem::zeroed() };

        let mut nfds: RawFd = 0;
        let mut watched: Vec<(RawFd, bool, bool)> = Vec::new();
        {
            let registry = self.registry.borrow();
            for (fd, read, write) in registry.slots() {
                assert!(
                    (fd as usize) < libc::FD_SETSIZE,
                    "fd {fd} exceeds FD_SETSIZE; use another backend"
                );
                // SAFETY: fd checked against FD_SETSIZE above.
                unsafe {
                    if read {
                        libc::FD_SET(fd, &mut read_set);
                    }
                    if write {
                        libc::FD_SET(fd, &mut write_set);
                    }
                }
                nfds = nfds.max(fd + 1);
                watched.push((fd, read, write));
            }
        }

        let mut tv = libc::timeval {
            tv_sec: max_wait.as_secs() as libc::time_t,
            tv_usec: max_wait.subsec_micros() as libc::suseconds_t,
        };

        // SAFETY: the sets and timeval live across the call; nfds bounds
        // every fd placed in the sets.
        let rc = unsafe {
            libc::select(
                nfds,
                &mut read_set,
                &mut write_set,
                ptr::null_mut(),
                &mut tv,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        if rc > 0 {
            let mut registry = self.registry.borrow_mut();
            for (fd, read, write) in watched {
                // SAFETY: same fds as above.
                unsafe {
                    if read && libc::FD_ISSET(fd, &read_set) {
                        registry.wake_ready(fd, Direction::Read);
                    }
                    if write && libc::FD_ISSET(fd, &write_set) {
                        registry.wake_ready(fd, Direction::Write);
                    }
                }
            }
        }
        Ok(())
    }
}
