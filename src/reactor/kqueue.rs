//! `kqueue(2)` readiness backend (macOS and the BSDs).
//!
//! Read and write interests map to separate `EVFILT_READ`/`EVFILT_WRITE`
//! kevents; the dirty-fd list turns into an `EV_ADD`/`EV_DELETE`
//! changelist applied together with the wait, so polling costs
//! O(#changes + #ready). `EV_EOF` wakes both directions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use super::registry::{registry_poller_methods, Registry};
use super::{Direction, Poller};
use crate::time::queue::to_timespec;

const EVENT_BATCH: usize = 256;

/// Readiness poller backed by `kqueue(2)`.
#[derive(Debug)]
pub struct KqueuePoller {
    registry: RefCell<Registry>,
    kq: RawFd,
    /// Filters currently installed in the kernel, per fd.
    kernel: RefCell<HashMap<RawFd, (bool, bool)>>,
}

impl KqueuePoller {
    /// Creates the kqueue instance.
    pub fn new() -> io::Result<Self> {
        // SAFETY: plain syscall; the fd is owned by this struct.
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            registry: RefCell::new(Registry::new()),
            kq,
            kernel: RefCell::new(HashMap::new()),
        })
    }

    fn change(fd: RawFd, filter: i16, flags: u16) -> libc::kevent {
        libc::kevent {
            ident: fd as usize,
            filter,
            flags,
            fflags: 0,
            data: 0,
            udata: ptr::null_mut(),
        }
    }

    fn pending_changes(&self) -> Vec<libc::kevent> {
        let dirty = self.registry.borrow_mut().take_dirty();
        if dirty.is_empty() {
            return Vec::new();
        }
        let registry = self.registry.borrow();
        let mut kernel = self.kernel.borrow_mut();
        let mut changes = Vec::new();
        for fd in dirty {
            let want = registry.interest(fd);
            let have = kernel.get(&fd).copied().unwrap_or((false, false));
            if want.0 != have.0 {
                let flags = if want.0 { libc::EV_ADD } else { libc::EV_DELETE };
                changes.push(Self::change(fd, libc::EVFILT_READ, flags));
            }
            if want.1 != have.1 {
                let flags = if want.1 { libc::EV_ADD } else { libc::EV_DELETE };
                changes.push(Self::change(fd, libc::EVFILT_WRITE, flags));
            }
            if want == (false, false) {
                kernel.remove(&fd);
            } else {
                kernel.insert(fd, want);
            }
        }
        changes
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        // SAFETY: kq was created by us and is closed exactly once.
        unsafe {
            libc::close(self.kq);
        }
    }
}

impl Poller for KqueuePoller {
    registry_poller_methods!();

    fn poll(&self, max_wait: Duration) -> io::Result<()> {
        let changes = self.pending_changes();
        let ts = to_timespec(max_wait);
        let mut events: [libc::kevent; EVENT_BATCH] =
            // SAFETY: kevent is a plain-data struct; zeroed is valid.
            unsafe { std::mem::zeroed() };

        // SAFETY: change and event arrays are valid for their stated
        // lengths; ts outlives the call. Deletes for already-closed fds
        // come back as EV_ERROR entries, dropped below.
        let n = unsafe {
            libc::kevent(
                self.kq,
                changes.as_ptr(),
                changes.len() as i32,
                events.as_mut_ptr(),
                EVENT_BATCH as i32,
                &ts,
            )
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
            let fd = ev.ident as RawFd;
            if ev.flags & libc::EV_ERROR != 0 {
                continue;
            }
            if ev.flags & libc::EV_EOF != 0 {
                registry.wake_error(fd);
                continue;
            }
            match ev.filter {
                libc::EVFILT_READ => registry.wake_ready(fd, Direction::Read),
                libc::EVFILT_WRITE => registry.wake_ready(fd, Direction::Write),
                _ => {}
            }
        }
        Ok(())
    }
}
