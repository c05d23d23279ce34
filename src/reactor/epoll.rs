//! `epoll(7)` readiness backend (Linux).
//!
//! Keeps a persistent kernel interest list: the registry's dirty-fd list
//! drives `epoll_ctl` ADD/MOD/DEL calls, so steady-state polling costs
//! O(#changes + #ready) rather than O(#registered).

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use tracing::trace;

use super::registry::{registry_poller_methods, Registry};
use super::{Direction, Poller};

const EVENT_BATCH: usize = 256;

/// Readiness poller backed by `epoll(7)`.
#[derive(Debug)]
pub struct EpollPoller {
    registry: RefCell<Registry>,
    epfd: RawFd,
    /// Interest mask currently installed in the kernel, per fd.
    kernel: RefCell<HashMap<RawFd, u32>>,
}

impl EpollPoller {
    /// Creates the epoll instance.
    pub fn new() -> io::Result<Self> {
        // SAFETY: plain syscall; the fd is owned by this struct.
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            registry: RefCell::new(Registry::new()),
            epfd,
            kernel: RefCell::new(HashMap::new()),
        })
    }

    /// Applies interest changes accumulated since the last poll.
    fn apply_changes(&self) {
        let dirty = self.registry.borrow_mut().take_dirty();
        if dirty.is_empty() {
            return;
        }
        let registry = self.registry.borrow();
        let mut kernel = self.kernel.borrow_mut();
        for fd in dirty {
            let (read, write) = registry.interest(fd);
            let mut mask = 0u32;
            if read {
                mask |= libc::EPOLLIN as u32;
            }
            if write {
                mask |= libc::EPOLLOUT as u32;
            }

            let op = match (kernel.get(&fd), mask) {
                (None, 0) => continue,
                (None, _) => libc::EPOLL_CTL_ADD,
                (Some(_), 0) => libc::EPOLL_CTL_DEL,
                (Some(&old), _) if old == mask => continue,
                (Some(_), _) => libc::EPOLL_CTL_MOD,
            };

            let mut ev = libc::epoll_event {
                events: mask,
                u64: fd as u64,
            };
            // SAFETY: epfd is a live epoll instance; `ev` outlives the
            // call. A DEL for an fd closed in the meantime fails with
            // EBADF/ENOENT, which is fine: the kernel dropped it already.
            let rc = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) };
            if rc == 0 {
                if op == libc::EPOLL_CTL_DEL {
                    kernel.remove(&fd);
                } else {
                    kernel.insert(fd, mask);
                }
            } else {
                trace!(fd, op, "epoll_ctl failed: {}", io::Error::last_os_error());
                kernel.remove(&fd);
            }
        }
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        // SAFETY: epfd was created by us and is closed exactly once.
        unsafe {
            libc::close(self.epfd);
        }
    }
}

impl Poller for EpollPoller {
    registry_poller_methods!();

    fn poll(&self, max_wait: Duration) -> io::Result<()> {
        self.apply_changes();

        let millis = max_wait
            .as_nanos()
            .div_ceil(1_000_000)
            .min(i32::MAX as u128) as i32;

        let mut events = [libc::epoll_event { events: 0, u64: 0 }; EVENT_BATCH];
        // SAFETY: the events array is valid for EVENT_BATCH entries.
        let n = unsafe {
            libc::epoll_wait(self.epfd, events.as_mut_ptr(), EVENT_BATCH as i32, millis)
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        let mut registry = self.registry.borrow_mut();
        for ev in &events[..n as usize] {
            let fd = ev.u64 as RawFd;
            if ev.events & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0 {
                registry.wake_error(fd);
                continue;
            }
            if ev.events & libc::EPOLLIN as u32 != 0 {
                registry.wake_ready(fd, Direction::Read);
            }
            if ev.events & libc::EPOLLOUT as u32 != 0 {
                registry.wake_ready(fd, Direction::Write);
            }
        }
        Ok(())
    }
}
