//! Future combinators: first-of (`any`), all-of (`all`), lazy value
//! mapping, and the small task-introspection awaitables.

mod all;
mod any;
mod map;

pub use all::{all, All};
pub use any::{any, Any};
pub use map::{FutureExt, Map};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// Resolves to the running task's waker.
///
/// The returned waker is identity-equal (`Waker::will_wake`) to every
/// other waker the runtime hands out for the same task. Completes on its
/// first poll without suspending.
#[must_use]
pub fn current_waker() -> CurrentWaker {
    CurrentWaker(())
}

/// Future of [`current_waker`].
#[derive(Debug)]
pub struct CurrentWaker(());

impl Future for CurrentWaker {
    type Output = Waker;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(cx.waker().clone())
    }
}

/// Yields once: reschedules the task and suspends, resuming on the run
/// queue's next pass. The primitive behind the `*_yield` socket variants.
#[must_use]
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future of [`yield_now`].
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
