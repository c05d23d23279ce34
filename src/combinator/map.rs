//! Lazy value mapping over a future.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Extension adapters for futures.
pub trait FutureExt: Future + Sized {
    /// Returns a future resolving to `f(self.await)`. The closure runs
    /// only when the inner future completes.
    fn map<U, F>(self, f: F) -> Map<Self, F>
    where
        F: FnOnce(Self::Output) -> U,
    {
        Map {
            future: Box::pin(self),
            f: Some(f),
        }
    }
}

impl<T: Future> FutureExt for T {}

/// Future returned by [`FutureExt::map`].
pub struct Map<Fut, F> {
    future: Pin<Box<Fut>>,
    f: Option<F>,
}

// `future` is already pinned independently via `Box::pin`; `Map` itself
// never pins `Fut` or `F` directly, so it can be moved freely regardless
// of whether they are `Unpin`.
impl<Fut, F> Unpin for Map<Fut, F> {}

impl<Fut, F, U> Future for Map<Fut, F>
where
    Fut: Future,
    F: FnOnce(Fut::Output) -> U,
{
    type Output = U;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.future.as_mut().poll(cx) {
            Poll::Ready(value) => {
                let f = this.f.take().expect("map polled after completion");
                Poll::Ready(f(value))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
