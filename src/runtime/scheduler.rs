//! Task storage and the FIFO run queue.
//!
//! Tasks live in a slab of slots; each slot carries a generation counter
//! so recycled ids cannot be woken or cancelled by stale handles. Every
//! task has one canonical waker created at insertion — all wakers seen by
//! reactors, timers, and combinators are clones of it, keeping waker
//! identity stable for the task's lifetime.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Waker};

use super::waker::{rc_waker, RcWake};

type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

struct TaskSlot {
    generation: u64,
    future: Option<TaskFuture>,
    waker: Waker,
    queued: bool,
    running: bool,
    rewake: bool,
}

#[derive(Default)]
struct Inner {
    slots: Vec<Option<TaskSlot>>,
    free: Vec<usize>,
    queue: VecDeque<usize>,
    next_generation: u64,
}

/// Single-threaded task scheduler.
#[derive(Default)]
pub(crate) struct Scheduler {
    inner: RefCell<Inner>,
}

/// Waker target: one task in one scheduler.
pub(crate) struct TaskRef {
    sched: Weak<Scheduler>,
    id: usize,
    generation: u64,
}

impl RcWake for TaskRef {
    fn wake_by_ref(self: &Rc<Self>) {
        if let Some(sched) = self.sched.upgrade() {
            sched.schedule(self.id, self.generation);
        }
    }
}

impl Scheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Stores a task and returns `(id, generation)`. The task is not
    /// queued yet; it starts lazily once [`schedule`](Self::schedule)d.
    pub fn insert(self: &Rc<Self>, future: TaskFuture) -> (usize, u64) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let generation = inner.next_generation;
        inner.next_generation += 1;

        let id = match inner.free.pop() {
            Some(id) => id,
            None => {
                inner.slots.push(None);
                inner.slots.len() - 1
            }
        };
        let waker = rc_waker(Rc::new(TaskRef {
            sched: Rc::downgrade(self),
            id,
            generation,
        }));
        inner.slots[id] = Some(TaskSlot {
            generation,
            future: Some(future),
            waker,
            queued: false,
            running: false,
            rewake: false,
        });
        (id, generation)
    }

    /// Queues a task for resumption; duplicate wakes collapse, and waking
    /// a running task re-queues it once after it yields.
    pub fn schedule(&self, id: usize, generation: u64) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let Some(slot) = inner.slots.get_mut(id).and_then(Option::as_mut) else {
            return;
        };
        if slot.generation != generation {
            return;
        }
        if slot.running {
            slot.rewake = true;
        } else if !slot.queued {
            slot.queued = true;
            inner.queue.push_back(id);
        }
    }

    /// Drops a task's frame, if it is still the one the caller knew.
    pub fn cancel(&self, id: usize, generation: u64) {
        let removed = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match inner.slots.get_mut(id) {
                Some(slot) if slot.as_ref().is_some_and(|s| s.generation == generation) => {
                    inner.free.push(id);
                    slot.take()
                }
                _ => None,
            }
        };
        // The frame drops with no scheduler borrow held: its fields may
        // unregister interests or tombstone timers on the way out.
        drop(removed);
    }

    /// The canonical waker of a live task.
    #[cfg(test)]
    pub fn waker_of(&self, id: usize, generation: u64) -> Option<Waker> {
        self.inner
            .borrow()
            .slots
            .get(id)
            .and_then(Option::as_ref)
            .filter(|s| s.generation == generation)
            .map(|s| s.waker.clone())
    }

    pub fn has_ready(&self) -> bool {
        !self.inner.borrow().queue.is_empty()
    }

    /// Resumes queued tasks FIFO, at most `cap` resumptions. Tasks woken
    /// while this runs join the same pass until the cap defers them to
    /// the next step.
    pub fn run(&self, cap: usize) {
        for _ in 0..cap {
            let Some(id) = self.inner.borrow_mut().queue.pop_front() else {
                return;
            };
            let taken = {
                let mut guard = self.inner.borrow_mut();
                let inner = &mut *guard;
                inner.slots.get_mut(id).and_then(Option::as_mut).map(|slot| {
                    slot.queued = false;
                    slot.running = true;
                    let future = slot.future.take().expect("task polled reentrantly");
                    (future, slot.waker.clone())
                })
            };
            let Some((mut future, waker)) = taken else {
                continue;
            };

            // No scheduler borrow is held while the future runs: polling
            // may spawn tasks, wake wakers, or drop sockets, all of which
            // reenter the scheduler or the poller.
            let done = future
                .as_mut()
                .poll(&mut Context::from_waker(&waker))
                .is_ready();

            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let Some(slot) = inner.slots.get_mut(id).and_then(Option::as_mut) else {
                continue; // cancelled while running
            };
            slot.running = false;
            if done {
                inner.slots[id] = None;
                inner.free.push(id);
            } else {
                slot.future = Some(future);
                if slot.rewake {
                    slot.rewake = false;
                    slot.queued = true;
                    inner.queue.push_back(id);
                }
            }
        }
    }
}
