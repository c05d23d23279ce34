//! Handles to spawned tasks.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use super::scheduler::Scheduler;

pub(crate) struct JoinState<T> {
    pub(crate) result: Option<T>,
    pub(crate) waiter: Option<Waker>,
    pub(crate) finished: bool,
}

impl<T> JoinState<T> {
    pub(crate) fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            result: None,
            waiter: None,
            finished: false,
        }))
    }
}

/// Owner-side handle to a spawned task.
///
/// Tasks are detached by default: dropping the handle leaves the task
/// running. Awaiting the handle installs the awaiter as the task's
/// continuation and yields the task's output when it completes.
/// [`cancel`](Self::cancel) drops the task's frame instead, which
/// unregisters any pending I/O interest and tombstones its timers; the
/// task never observes its post-suspension code again.
pub struct JoinHandle<T> {
    pub(crate) state: Rc<RefCell<JoinState<T>>>,
    pub(crate) sched: Weak<Scheduler>,
    pub(crate) id: usize,
    pub(crate) generation: u64,
}

impl<T> JoinHandle<T> {
    /// True once the task has produced its result.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }

    /// Drops the task's frame. A no-op if the task already completed.
    pub fn cancel(self) {
        if let Some(sched) = self.sched.upgrade() {
            sched.cancel(self.id, self.generation);
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if state.finished {
            return Poll::Ready(
                state
                    .result
                    .take()
                    .expect("join handle awaited after its result was taken"),
            );
        }
        state.waiter = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> std::fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
