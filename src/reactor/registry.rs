//! Shared bookkeeping embedded in every backend: interest slots, the
//! timer queue, the ready queue, and the dirty-fd list that lets stateful
//! backends apply O(#changes) kernel updates.

use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;
use std::task::Waker;
use std::time::Instant;

use super::Direction;
use crate::time::queue::TimerQueue;

#[derive(Debug)]
pub(crate) struct IoEntry {
    waker: Waker,
    timer: Option<u64>,
}

#[derive(Debug, Default)]
pub(crate) struct FdSlot {
    read: Option<IoEntry>,
    write: Option<IoEntry>,
}

impl FdSlot {
    fn entry_mut(&mut self, dir: Direction) -> &mut Option<IoEntry> {
        match dir {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }

    fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

/// Interest table + timers + ready queue shared by all backends.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    slots: HashMap<RawFd, FdSlot>,
    dirty: Vec<RawFd>,
    pub(crate) timers: TimerQueue,
    ready: VecDeque<Waker>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        fd: RawFd,
        dir: Direction,
        waker: &Waker,
        deadline: Option<Instant>,
    ) {
        let timer = deadline.map(|at| self.timers.add_bound(at, waker, Some((fd, dir))));
        let slot = self.slots.entry(fd).or_default();
        let entry = slot.entry_mut(dir);
        assert!(
            entry.is_none(),
            "interest already registered for fd {fd} ({dir:?})"
        );
        *entry = Some(IoEntry {
            waker: waker.clone(),
            timer,
        });
        self.dirty.push(fd);
    }

    pub fn unregister(&mut self, fd: RawFd, dir: Direction) {
        if let Some(slot) = self.slots.get_mut(&fd) {
            if let Some(entry) = slot.entry_mut(dir).take() {
                if let Some(id) = entry.timer {
                    self.timers.cancel(id);
                }
                self.dirty.push(fd);
            }
            if slot.is_empty() {
                self.slots.remove(&fd);
            }
        }
    }

    pub fn unregister_fd(&mut self, fd: RawFd) {
        self.unregister(fd, Direction::Read);
        self.unregister(fd, Direction::Write);
    }

    /// Consumes the interest for `(fd, dir)` and queues its waker.
    ///
    /// Safe to call for fds with no interest left (late or spurious
    /// events are ignored).
    pub fn wake_ready(&mut self, fd: RawFd, dir: Direction) {
        if let Some(slot) = self.slots.get_mut(&fd) {
            if let Some(entry) = slot.entry_mut(dir).take() {
                if let Some(id) = entry.timer {
                    self.timers.cancel(id);
                }
                self.ready.push_back(entry.waker);
                self.dirty.push(fd);
            }
            if slot.is_empty() {
                self.slots.remove(&fd);
            }
        }
    }

    /// Error/hangup on `fd`: both directions wake so the owning task can
    /// pick the failure up from its next syscall.
    pub fn wake_error(&mut self, fd: RawFd) {
        self.wake_ready(fd, Direction::Read);
        self.wake_ready(fd, Direction::Write);
    }

    /// True while `(fd, dir)` has an armed interest.
    pub fn has_interest(&self, fd: RawFd, dir: Direction) -> bool {
        self.slots.get(&fd).is_some_and(|s| match dir {
            Direction::Read => s.read.is_some(),
            Direction::Write => s.write.is_some(),
        })
    }

    /// Interest mask of `fd` as `(read, write)`.
    pub fn interest(&self, fd: RawFd) -> (bool, bool) {
        self.slots
            .get(&fd)
            .map_or((false, false), |s| (s.read.is_some(), s.write.is_some()))
    }

    pub fn slots(&self) -> impl Iterator<Item = (RawFd, bool, bool)> + '_ {
        self.slots
            .iter()
            .map(|(fd, s)| (*fd, s.read.is_some(), s.write.is_some()))
    }

    /// Fds whose interest changed since the last call, deduplicated.
    pub fn take_dirty(&mut self) -> Vec<RawFd> {
        let mut dirty = std::mem::take(&mut self.dirty);
        dirty.sort_unstable();
        dirty.dedup();
        dirty
    }

    pub fn drain_ready_into(&mut self, run: &mut VecDeque<Waker>) {
        run.extend(self.ready.drain(..));
    }

    /// Expires timers due at `now` into `run`. A deadline bound to an
    /// interest unregisters that interest before its waker is queued.
    pub fn drain_expired_into(&mut self, now: Instant, run: &mut VecDeque<Waker>) {
        for expired in self.timers.drain_expired(now) {
            if let Some((fd, dir)) = expired.io {
                self.clear_bound(fd, dir, expired.id);
            }
            run.push_back(expired.waker);
        }
    }

    /// Clears the interest slot an expired deadline was bound to, but only
    /// if the slot still belongs to that deadline (the fd may have been
    /// re-registered since).
    fn clear_bound(&mut self, fd: RawFd, dir: Direction, timer_id: u64) {
        if let Some(slot) = self.slots.get_mut(&fd) {
            let entry = slot.entry_mut(dir);
            if entry.as_ref().is_some_and(|e| e.timer == Some(timer_id)) {
                *entry = None;
                self.dirty.push(fd);
            }
            if slot.is_empty() {
                self.slots.remove(&fd);
            }
        }
    }
}

/// Expands to the [`Poller`](super::Poller) methods every backend serves
/// straight from its `registry: RefCell<Registry>` field. Backends add
/// their own `poll` (and overrides) next to it.
macro_rules! registry_poller_methods {
    () => {
        fn register(
            &self,
            fd: std::os::fd::RawFd,
            dir: $crate::reactor::Direction,
            waker: &std::task::Waker,
            deadline: Option<std::time::Instant>,
        ) {
            self.registry.borrow_mut().register(fd, dir, waker, deadline);
        }

        fn unregister(&self, fd: std::os::fd::RawFd, dir: $crate::reactor::Direction) {
            self.registry.borrow_mut().unregister(fd, dir);
        }

        fn is_registered(&self, fd: std::os::fd::RawFd, dir: $crate::reactor::Direction) -> bool {
            self.registry.borrow().has_interest(fd, dir)
        }

        fn unregister_fd(&self, fd: std::os::fd::RawFd) {
            self.registry.borrow_mut().unregister_fd(fd);
        }

        fn add_timer(&self, deadline: std::time::Instant, waker: &std::task::Waker) -> u64 {
            self.registry.borrow_mut().timers.add(deadline, waker)
        }

        fn cancel_timer(&self, id: u64) -> bool {
            self.registry.borrow_mut().timers.cancel(id)
        }

        fn timers(&self) -> usize {
            self.registry.borrow().timers.len()
        }

        fn next_deadline(&self) -> Option<std::time::Instant> {
            self.registry.borrow_mut().timers.next_deadline()
        }

        fn drain_ready(&self, run: &mut std::collections::VecDeque<std::task::Waker>) {
            self.registry.borrow_mut().drain_ready_into(run);
        }

        fn drain_expired(&self, run: &mut std::collections::VecDeque<std::task::Waker>) {
            self.registry
                .borrow_mut()
                .drain_expired_into(std::time::Instant::now(), run);
        }
    };
}

pub(crate) use registry_poller_methods;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::task::Wake;
    use std::time::Duration;

    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    fn noop_waker() -> Waker {
        Waker::from(Arc::new(NoopWaker))
    }

    #[test]
    fn ready_consumes_interest_and_timer() {
        let mut reg = Registry::new();
        let w = noop_waker();
        let deadline = Instant::now() + Duration::from_secs(5);
        reg.register(7, Direction::Read, &w, Some(deadline));
        assert_eq!(reg.timers.len(), 1);

        reg.wake_ready(7, Direction::Read);
        assert_eq!(reg.interest(7), (false, false));
        assert_eq!(reg.timers.len(), 0, "bound deadline must be cancelled");

        let mut run = VecDeque::new();
        reg.drain_ready_into(&mut run);
        assert_eq!(run.len(), 1);
    }

    #[test]
    fn expired_deadline_clears_interest_first() {
        let mut reg = Registry::new();
        let w = noop_waker();
        let now = Instant::now();
        reg.register(3, Direction::Write, &w, Some(now));

        let mut run = VecDeque::new();
        reg.drain_expired_into(now, &mut run);
        assert_eq!(run.len(), 1);
        assert_eq!(reg.interest(3), (false, false));
        assert!(reg.take_dirty().contains(&3));
    }

    #[test]
    fn error_wakes_both_directions() {
        let mut reg = Registry::new();
        let w = noop_waker();
        reg.register(9, Direction::Read, &w, None);
        reg.register(9, Direction::Write, &w, None);

        reg.wake_error(9);
        let mut run = VecDeque::new();
        reg.drain_ready_into(&mut run);
        assert_eq!(run.len(), 2);
    }

    #[test]
    #[should_panic(expected = "interest already registered")]
    fn duplicate_interest_is_a_programmer_error() {
        let mut reg = Registry::new();
        let w = noop_waker();
        reg.register(1, Direction::Read, &w, None);
        reg.register(1, Direction::Read, &w, None);
    }

    #[test]
    fn spurious_ready_is_ignored() {
        let mut reg = Registry::new();
        reg.wake_ready(42, Direction::Read);
        let mut run = VecDeque::new();
        reg.drain_ready_into(&mut run);
        assert!(run.is_empty());
    }
}
