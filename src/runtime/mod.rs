//! The event loop: poller, timers, and task scheduling in one thread.
//!
//! [`EventLoop`] is generic over its reactor backend. One `step()` is:
//!
//! 1. compute the blocking budget from the nearest timer deadline
//!    (zero when tasks are already runnable),
//! 2. `poll` the backend,
//! 3. drain readiness wakers, then expired timers — so a task racing a
//!    read against a sleep observes the I/O first on a tie,
//! 4. resume queued tasks FIFO, with a per-step cap; anything deferred
//!    keeps the next poll's budget at zero.
//!
//! Tasks are lazy: [`spawn`](EventLoop::spawn) queues the task but runs
//! none of its body until the loop's next pass. `run_until` drives a root
//! future (plus every spawned task) to the root's completion.

mod join;
mod scheduler;
pub(crate) mod waker;

pub use join::JoinHandle;

use std::cell::Cell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::Result;
use crate::reactor::Poller;
use crate::time::poll_timeout;
use join::JoinState;
use scheduler::Scheduler;
use waker::{rc_waker, RcWake};

/// Longest a single poll may block, even with no deadline pending.
const MAX_WAIT: Duration = Duration::from_secs(10);
/// Cap on task resumptions per step; the remainder runs next step so a
/// wake-storm cannot starve I/O and timers.
const STEP_RESUME_CAP: usize = 4096;

/// Single-threaded cooperative event loop over a reactor backend.
pub struct EventLoop<P: Poller> {
    poller: Rc<P>,
    sched: Rc<Scheduler>,
}

impl<P: Poller + 'static> EventLoop<P> {
    /// Wraps a backend into a runnable loop.
    pub fn new(poller: P) -> Self {
        let _ = crate::init::NetInit::new();
        Self {
            poller: Rc::new(poller),
            sched: Scheduler::new(),
        }
    }

    /// The shared poller handle sockets and timers are built from.
    #[must_use]
    pub fn poller(&self) -> &Rc<P> {
        &self.poller
    }

    /// Spawns a task. It starts lazily on the loop's next pass and runs
    /// detached until the returned handle is awaited.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        spawn_on(&self.sched, future)
    }

    /// A clonable handle for spawning from inside tasks.
    #[must_use]
    pub fn spawner(&self) -> Spawner {
        Spawner {
            sched: Rc::downgrade(&self.sched),
        }
    }

    /// One iteration of the loop: poll, drain, resume.
    pub fn step(&self) -> Result<()> {
        let budget = if self.sched.has_ready() {
            Duration::ZERO
        } else {
            match self.poller.next_deadline() {
                Some(deadline) => poll_timeout(Instant::now(), deadline, MAX_WAIT),
                None => MAX_WAIT,
            }
        };

        self.poller.poll(budget)?;

        let mut run = VecDeque::new();
        self.poller.drain_ready(&mut run);
        self.poller.drain_expired(&mut run);
        if !run.is_empty() {
            trace!(wakers = run.len(), "step wakeup");
        }
        for waker in run {
            waker.wake();
        }

        self.sched.run(STEP_RESUME_CAP);
        Ok(())
    }

    /// Steps the loop until `future` completes, returning its output.
    ///
    /// Blocks the calling thread. Spawned tasks keep running while the
    /// root is pending; tasks still alive when the root completes are
    /// dropped with the loop, not here.
    pub fn run_until<F: Future>(&self, future: F) -> F::Output {
        let mut future = pin!(future);
        let signal = Rc::new(RootSignal {
            woken: Cell::new(true),
        });
        let waker = rc_waker(Rc::clone(&signal));
        let mut cx = Context::from_waker(&waker);

        loop {
            if signal.woken.replace(false) {
                if let Poll::Ready(value) = future.as_mut().poll(&mut cx) {
                    return value;
                }
            }
            self.sched.run(STEP_RESUME_CAP);
            if signal.woken.get() {
                continue;
            }
            self.step().expect("reactor poll failed");
        }
    }
}

/// Spawns tasks onto a loop from anywhere on its thread.
#[derive(Clone)]
pub struct Spawner {
    sched: std::rc::Weak<Scheduler>,
}

impl Spawner {
    /// Spawns a task on the loop this handle came from.
    ///
    /// # Panics
    ///
    /// Panics if the event loop has been dropped.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let sched = self.sched.upgrade().expect("event loop is gone");
        spawn_on(&sched, future)
    }
}

impl std::fmt::Debug for Spawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawner").finish_non_exhaustive()
    }
}

fn spawn_on<F>(sched: &Rc<Scheduler>, future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let state = JoinState::new();
    let completion = Rc::clone(&state);
    let wrapped = async move {
        let value = future.await;
        let waiter = {
            let mut st = completion.borrow_mut();
            st.result = Some(value);
            st.finished = true;
            st.waiter.take()
        };
        if let Some(w) = waiter {
            w.wake();
        }
    };
    let (id, generation) = sched.insert(Box::pin(wrapped));
    sched.schedule(id, generation);
    JoinHandle {
        state,
        sched: Rc::downgrade(sched),
        id,
        generation,
    }
}

struct RootSignal {
    woken: Cell<bool>,
}

impl RcWake for RootSignal {
    fn wake_by_ref(self: &Rc<Self>) {
        self.woken.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::current_waker;
    use crate::reactor::SelectPoller;
    use std::cell::RefCell;

    fn event_loop() -> EventLoop<SelectPoller> {
        EventLoop::new(SelectPoller::new().unwrap())
    }

    #[test]
    fn spawn_is_lazy_until_stepped() {
        let lp = event_loop();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let handle = lp.spawn(async move {
            flag.set(true);
        });
        assert!(!ran.get(), "spawn must not run the task body");
        lp.run_until(handle);
        assert!(ran.get());
    }

    #[test]
    fn join_handle_returns_the_value() {
        let lp = event_loop();
        let handle = lp.spawn(async { 41 + 1 });
        assert_eq!(lp.run_until(handle), 42);
    }

    #[test]
    fn detached_task_still_runs() {
        let lp = event_loop();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        drop(lp.spawn(async move {
            flag.set(true);
        }));
        lp.step().unwrap();
        assert!(ran.get());
    }

    #[test]
    fn cancelled_task_never_resumes() {
        let lp = event_loop();
        let poller = lp.poller().clone();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let handle = lp.spawn(async move {
            crate::time::sleep(&poller, std::time::Duration::from_millis(20)).await;
            flag.set(true);
        });
        lp.step().unwrap(); // the task parks on its timer
        handle.cancel();
        assert_eq!(
            crate::reactor::Poller::timers(&**lp.poller()),
            0,
            "cancel must tombstone the task's timer"
        );
        // Drive the loop well past the cancelled task's deadline.
        let wait = lp.poller().clone();
        lp.run_until(async move {
            crate::time::sleep(&wait, std::time::Duration::from_millis(40)).await;
        });
        assert!(!ran.get(), "post-suspension code of a cancelled task ran");
    }

    #[test]
    fn current_waker_matches_the_canonical_one() {
        let lp = event_loop();
        let seen = Rc::new(RefCell::new(None));
        let out = Rc::clone(&seen);
        let handle = lp.spawn(async move {
            *out.borrow_mut() = Some(current_waker().await);
        });
        let external = lp
            .sched
            .waker_of(handle.id, handle.generation)
            .expect("task is live");
        lp.run_until(handle);
        let inner = seen.borrow().clone().expect("task captured its waker");
        assert!(inner.will_wake(&external));
    }
}
