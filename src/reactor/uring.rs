//! io_uring completion backend (Linux).
//!
//! The completion family exposes the readiness facade by submitting
//! actual kernel requests: each registered interest becomes a oneshot
//! `PollAdd` SQE whose completion wakes the registered waker, with the
//! completion's raw result readable through
//! [`last_result`](super::Poller::last_result) until the next completion
//! lands. Interests dropped before completing (deadline expiry, explicit
//! unregister) are chased with an `AsyncCancel` SQE; a request's waker is
//! resumed exactly once whether it completes or is cancelled.
//!
//! When the submission queue has no free entries, the backend calls
//! `submit_and_wait(1)` to drain some completions before queueing more.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use io_uring::{opcode, squeue, types, IoUring};
use tracing::trace;

use super::registry::{registry_poller_methods, Registry};
use super::{Direction, Poller};

const DEFAULT_ENTRIES: u32 = 256;
/// user_data for AsyncCancel SQEs; their completions carry no waker.
const CANCEL_DATA: u64 = u64::MAX;

/// Completion poller backed by io_uring.
pub struct UringPoller {
    registry: RefCell<Registry>,
    ring: RefCell<IoUring>,
    /// user_data → registered interest, for in-flight poll requests.
    tokens: RefCell<HashMap<u64, (RawFd, Direction)>>,
    /// Registered interest → user_data of its in-flight request.
    inflight: RefCell<HashMap<(RawFd, Direction), u64>>,
    next_token: Cell<u64>,
    last_result: Cell<Option<i32>>,
}

impl UringPoller {
    /// Creates a ring with the default submission queue size.
    pub fn new() -> io::Result<Self> {
        Self::with_entries(DEFAULT_ENTRIES)
    }

    /// Creates a ring sized for `entries` submission slots.
    pub fn with_entries(entries: u32) -> io::Result<Self> {
        let ring = IoUring::new(entries)?;
        Ok(Self {
            registry: RefCell::new(Registry::new()),
            ring: RefCell::new(ring),
            tokens: RefCell::new(HashMap::new()),
            inflight: RefCell::new(HashMap::new()),
            next_token: Cell::new(0),
            last_result: Cell::new(None),
        })
    }

    fn poll_mask(dir: Direction) -> u32 {
        match dir {
            Direction::Read => libc::POLLIN as u32,
            Direction::Write => libc::POLLOUT as u32,
        }
    }

    /// Pushes one SQE, draining completions via `submit_and_wait(1)` when
    /// the submission queue is out of entries.
    fn push_sqe(&self, ring: &mut IoUring, entry: &squeue::Entry) -> io::Result<()> {
        loop {
            // SAFETY: PollAdd/AsyncCancel entries reference only the fd
            // and user_data; no caller buffers are borrowed by the kernel.
            let res = unsafe { ring.submission().push(entry) };
            match res {
                Ok(()) => return Ok(()),
                Err(_full) => {
                    trace!("submission queue full, draining one completion");
                    ring.submitter().submit_and_wait(1)?;
                }
            }
        }
    }

    /// Reconciles in-flight kernel requests with the interest table:
    /// new interests get a `PollAdd`, vanished ones an `AsyncCancel`.
    fn reconcile(&self, ring: &mut IoUring) -> io::Result<()> {
        let dirty = self.registry.borrow_mut().take_dirty();
        for fd in dirty {
            let (read, write) = self.registry.borrow().interest(fd);
            for (dir, want) in [(Direction::Read, read), (Direction::Write, write)] {
                let key = (fd, dir);
                let inflight = self.inflight.borrow().get(&key).copied();
                match (want, inflight) {
                    (true, None) => {
                        let token = self.next_token.get();
                        self.next_token.set(token + 1);
                        self.tokens.borrow_mut().insert(token, key);
                        self.inflight.borrow_mut().insert(key, token);
                        let entry = opcode::PollAdd::new(types::Fd(fd), Self::poll_mask(dir))
                            .build()
                            .user_data(token);
                        self.push_sqe(ring, &entry)?;
                    }
                    (false, Some(token)) => {
                        self.inflight.borrow_mut().remove(&key);
                        let entry = opcode::AsyncCancel::new(token)
                            .build()
                            .user_data(CANCEL_DATA);
                        self.push_sqe(ring, &entry)?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn drain_completions(&self, ring: &mut IoUring) {
        let completions: Vec<(u64, i32)> = ring
            .completion()
            .map(|cqe| (cqe.user_data(), cqe.result()))
            .collect();

        let mut registry = self.registry.borrow_mut();
        for (user_data, result) in completions {
            if user_data == CANCEL_DATA {
                continue;
            }
            let Some((fd, dir)) = self.tokens.borrow_mut().remove(&user_data) else {
                continue;
            };
            {
                let mut inflight = self.inflight.borrow_mut();
                if inflight.get(&(fd, dir)) == Some(&user_data) {
                    inflight.remove(&(fd, dir));
                }
            }
            self.last_result.set(Some(result));
            if result < 0 {
                if result == -libc::ECANCELED {
                    // The interest was dropped before completion; its
                    // waker already ran (deadline) or was discarded.
                    continue;
                }
                registry.wake_error(fd);
            } else if result as u32 & (libc::POLLERR | libc::POLLHUP) as u32 != 0 {
                registry.wake_error(fd);
            } else {
                registry.wake_ready(fd, dir);
            }
        }
    }
}

impl Poller for UringPoller {
    registry_poller_methods!();

    fn poll(&self, max_wait: Duration) -> io::Result<()> {
        let mut ring = self.ring.borrow_mut();
        self.reconcile(&mut ring)?;

        // Waiting for one completion with a timespec doubles as the
        // loop's sleep when nothing is in flight.
        let wait_for = usize::from(!max_wait.is_zero());
        let ts = types::Timespec::new()
            .sec(max_wait.as_secs())
            .nsec(max_wait.subsec_nanos());
        let args = types::SubmitArgs::new().timespec(&ts);
        match ring.submitter().submit_with_args(wait_for, &args) {
            Ok(_) => {}
            Err(ref e)
                if e.raw_os_error() == Some(libc::ETIME)
                    || e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }

        self.drain_completions(&mut ring);
        Ok(())
    }

    fn last_result(&self) -> Option<i32> {
        self.last_result.get()
    }
}

impl std::fmt::Debug for UringPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UringPoller")
            .field("inflight", &self.inflight.borrow().len())
            .field("timers", &self.registry.borrow().timers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Waker;
    use std::sync::Arc;
    use std::task::Wake;

    struct CountWaker(AtomicUsize);

    impl Wake for CountWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        (fds[0], fds[1])
    }

    fn write_byte(fd: RawFd, byte: u8) {
        let buf = [byte];
        let n = unsafe { libc::write(fd, buf.as_ptr().cast(), 1) };
        assert_eq!(n, 1);
    }

    fn close(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    #[test]
    fn create() {
        UringPoller::with_entries(256).expect("ring setup");
    }

    #[test]
    fn read_completion_carries_poll_mask() {
        let poller = UringPoller::with_entries(256).unwrap();
        let (r, w) = pipe();
        write_byte(w, b'e');

        let counter = Arc::new(CountWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        poller.register(r, Direction::Read, &waker, None);
        poller.poll(Duration::from_secs(5)).unwrap();

        let mut run = VecDeque::new();
        poller.drain_ready(&mut run);
        assert_eq!(run.len(), 1);
        run.pop_front().unwrap().wake();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        let result = poller.last_result().expect("completion result");
        assert!(result > 0 && result as u32 & libc::POLLIN as u32 != 0);
        close(r);
        close(w);
    }

    #[test]
    fn write_side_completes() {
        let poller = UringPoller::with_entries(256).unwrap();
        let (r, w) = pipe();

        let waker = Waker::from(Arc::new(CountWaker(AtomicUsize::new(0))));
        poller.register(w, Direction::Write, &waker, None);
        poller.poll(Duration::from_secs(5)).unwrap();

        let mut run = VecDeque::new();
        poller.drain_ready(&mut run);
        assert_eq!(run.len(), 1);
        let result = poller.last_result().unwrap();
        assert!(result as u32 & libc::POLLOUT as u32 != 0);
        close(r);
        close(w);
    }

    #[test]
    fn full_submission_queue_drains_inline() {
        // A one-entry ring forces push_sqe through submit_and_wait(1).
        let poller = UringPoller::with_entries(1).unwrap();
        let (r1, w1) = pipe();
        let (r2, w2) = pipe();
        write_byte(w1, b'k');
        write_byte(w2, b'k');

        let waker = Waker::from(Arc::new(CountWaker(AtomicUsize::new(0))));
        poller.register(r1, Direction::Read, &waker, None);
        poller.register(r2, Direction::Read, &waker, None);
        poller.poll(Duration::from_secs(5)).unwrap();
        // Both completions may need a second poll depending on how the
        // inline drain interleaved.
        poller.poll(Duration::from_millis(100)).unwrap();

        let mut run = VecDeque::new();
        poller.drain_ready(&mut run);
        assert!(!run.is_empty());
        for fd in [r1, w1, r2, w2] {
            close(fd);
        }
    }

    #[test]
    fn unregister_cancels_inflight_request() {
        let poller = UringPoller::with_entries(8).unwrap();
        let (r, w) = pipe();

        let waker = Waker::from(Arc::new(CountWaker(AtomicUsize::new(0))));
        poller.register(r, Direction::Read, &waker, None);
        // Nothing readable yet: the request stays in flight.
        poller.poll(Duration::ZERO).unwrap();

        poller.unregister(r, Direction::Read);
        poller.poll(Duration::ZERO).unwrap();

        let mut run = VecDeque::new();
        poller.drain_ready(&mut run);
        assert!(run.is_empty(), "cancelled request must not wake");
        close(r);
        close(w);
    }
}
