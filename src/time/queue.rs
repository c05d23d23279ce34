//! Ordered deadline store driving the event loop's wake times.
//!
//! The queue is a min-heap keyed by `(deadline, id)`, where `id` grows
//! monotonically, so entries with equal deadlines expire in insertion
//! order. Cancellation is lazy: a cancelled id is dropped from the live
//! table immediately but its heap key is only discarded when it reaches
//! the top.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::os::fd::RawFd;
use std::task::Waker;
use std::time::{Duration, Instant};

use crate::reactor::Direction;

/// An expired live timer, handed back to the poller for wakeup.
#[derive(Debug)]
pub(crate) struct Expired {
    /// Identifier the entry was registered under.
    pub id: u64,
    /// The waker to resume.
    pub waker: Waker,
    /// I/O interest this deadline was bound to, if any.
    pub io: Option<(RawFd, Direction)>,
}

#[derive(Debug)]
struct Entry {
    waker: Waker,
    io: Option<(RawFd, Direction)>,
}

/// Min-heap of `(deadline, id, waker)` entries with lazy cancellation.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    live: HashMap<u64, Entry>,
    next_id: u64,
}

impl TimerQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `waker` to fire at `deadline`; returns the entry id.
    pub fn add(&mut self, deadline: Instant, waker: &Waker) -> u64 {
        self.add_bound(deadline, waker, None)
    }

    /// Registers a deadline bound to an I/O interest slot.
    ///
    /// When the deadline expires, the poller clears the bound interest
    /// before the waker runs, so the resumed operation observes a timeout
    /// with nothing left registered.
    pub(crate) fn add_bound(
        &mut self,
        deadline: Instant,
        waker: &Waker,
        io: Option<(RawFd, Direction)>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse((deadline, id)));
        self.live.insert(
            id,
            Entry {
                waker: waker.clone(),
                io,
            },
        );
        id
    }

    /// Cancels a pending entry. Returns false if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, id: u64) -> bool {
        self.live.remove(&id).is_some()
    }

    /// Number of live (not cancelled, not fired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// True when no live entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Earliest live deadline, if any. Discards tombstones on the way.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if self.live.contains_key(&id) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Removes every entry with `deadline <= now` and returns the live
    /// ones in `(deadline, id)` order.
    pub(crate) fn drain_expired(&mut self, now: Instant) -> Vec<Expired> {
        let mut fired = Vec::new();
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            if let Some(entry) = self.live.remove(&id) {
                fired.push(Expired {
                    id,
                    waker: entry.waker,
                    io: entry.io,
                });
            }
        }
        fired
    }
}

/// Time until `deadline` as seen from `now`, capped at `max` and clamped
/// at zero. This is the blocking budget handed to the OS poll primitive.
#[must_use]
pub fn poll_timeout(now: Instant, deadline: Instant, max: Duration) -> Duration {
    deadline.saturating_duration_since(now).min(max)
}

/// Converts a duration to a `libc::timespec` for the readiness syscalls.
pub(crate) fn to_timespec(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}
