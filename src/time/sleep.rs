//! Sleep futures backed by the poller's timer queue.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::reactor::Poller;

/// Future that completes once its deadline has passed.
///
/// The timer entry is registered on first poll and tombstoned on drop if
/// it has not fired, so an abandoned sleep (a losing [`any`] branch, a
/// dropped task) leaves nothing behind but a lazily-reaped heap key.
///
/// [`any`]: crate::combinator::any
#[derive(Debug)]
pub struct Sleep<P: Poller> {
    poller: Rc<P>,
    deadline: Instant,
    timer: Option<u64>,
    done: bool,
}

impl<P: Poller> Sleep<P> {
    /// The absolute completion time.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Sleeps for `duration` from now.
pub fn sleep<P: Poller>(poller: &Rc<P>, duration: Duration) -> Sleep<P> {
    sleep_until(poller, Instant::now() + duration)
}

/// Sleeps until `deadline`.
pub fn sleep_until<P: Poller>(poller: &Rc<P>, deadline: Instant) -> Sleep<P> {
    Sleep {
        poller: Rc::clone(poller),
        deadline,
        timer: None,
        done: false,
    }
}

impl<P: Poller> Future for Sleep<P> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(());
        }
        if Instant::now() >= this.deadline {
            this.done = true;
            // The queue consumed the entry when it fired; a cancel here
            // only matters if we completed by clock check before expiry
            // processing.
            if let Some(id) = this.timer.take() {
                this.poller.cancel_timer(id);
            }
            return Poll::Ready(());
        }
        if this.timer.is_none() {
            this.timer = Some(this.poller.add_timer(this.deadline, cx.waker()));
        }
        Poll::Pending
    }
}

impl<P: Poller> Drop for Sleep<P> {
    fn drop(&mut self) {
        if let Some(id) = self.timer.take() {
            self.poller.cancel_timer(id);
        }
    }
}
