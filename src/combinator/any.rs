//! First-completion combinator.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Completes with the output of the first future to finish; every other
/// future is dropped at that moment.
///
/// Dropping a losing future is its cancellation: pending I/O interests
/// unregister and timer entries tombstone through the fields' `Drop`
/// impls. Because the winner and the losers are polled by the same task,
/// losers scheduled on the same tick as the winner are cancelled before
/// any of their post-suspension code can run.
///
/// # Panics
///
/// Panics if `futures` is empty.
pub fn any<F: Future>(futures: Vec<F>) -> Any<F> {
    assert!(!futures.is_empty(), "any() needs at least one future");
    Any {
        children: futures.into_iter().map(|f| Some(Box::pin(f))).collect(),
    }
}

/// Future returned by [`any`].
pub struct Any<F: Future> {
    children: Vec<Option<Pin<Box<F>>>>,
}

impl<F: Future> Future for Any<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        for i in 0..this.children.len() {
            let Some(future) = this.children[i].as_mut() else {
                continue;
            };
            if let Poll::Ready(value) = future.as_mut().poll(cx) {
                // Dropping the losers here is their cancellation.
                this.children.clear();
                return Poll::Ready(value);
            }
        }
        Poll::Pending
    }
}

impl<F: Future> std::fmt::Debug for Any<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Any")
            .field("pending", &self.children.iter().filter(|c| c.is_some()).count())
            .finish()
    }
}
