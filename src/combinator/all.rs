//! All-completions combinator with fail-fast error propagation.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Result;

enum Child<T, F> {
    Pending(Pin<Box<F>>),
    Done(T),
    Taken,
}

/// Completes with every output in input order, or with the first error.
///
/// On the first `Err` the remaining futures are dropped (cancelled) and
/// the aggregate resolves to that error.
pub fn all<T, F>(futures: Vec<F>) -> All<T, F>
where
    F: Future<Output = Result<T>>,
{
    All {
        children: futures
            .into_iter()
            .map(|f| Child::Pending(Box::pin(f)))
            .collect(),
    }
}

/// Future returned by [`all`].
pub struct All<T, F> {
    children: Vec<Child<T, F>>,
}

// Every `F` is already pinned independently via `Box::pin` inside
// `Child::Pending`; `All` itself never pins `T` or `F` directly, so it
// can be moved freely regardless of whether they are `Unpin`.
impl<T, F> Unpin for All<T, F> {}

impl<T, F> Future for All<T, F>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<Vec<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut remaining = 0;
        for i in 0..this.children.len() {
            if let Child::Pending(future) = &mut this.children[i] {
                match future.as_mut().poll(cx) {
                    Poll::Ready(Ok(value)) => this.children[i] = Child::Done(value),
                    Poll::Ready(Err(e)) => {
                        // Dropping the rest cancels them.
                        this.children.clear();
                        return Poll::Ready(Err(e));
                    }
                    Poll::Pending => remaining += 1,
                }
            }
        }
        if remaining > 0 {
            return Poll::Pending;
        }
        let values = this
            .children
            .iter_mut()
            .map(|child| match std::mem::replace(child, Child::Taken) {
                Child::Done(value) => value,
                _ => unreachable!("all children resolved"),
            })
            .collect();
        Poll::Ready(Ok(values))
    }
}

impl<T, F> std::fmt::Debug for All<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("All").field("len", &self.children.len()).finish()
    }
}
