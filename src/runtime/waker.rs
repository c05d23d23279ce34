//! `Rc`-backed waker construction.
//!
//! The runtime is single-threaded, so wakers are built over `Rc` with a
//! hand-rolled [`RawWakerVTable`] instead of the `Arc`-based `Wake`
//! trait. Clones of one waker share the same `Rc` allocation, which makes
//! `Waker::will_wake` an identity test — the property the task-identity
//! awaitable and the timer queue rely on.
//!
//! These wakers must never leave the loop's thread; nothing in the crate
//! hands them across threads.

use std::mem::ManuallyDrop;
use std::rc::Rc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Types that can be woken through an `Rc` handle.
pub(crate) trait RcWake: 'static {
    /// Schedules the owner; must not reenter the scheduler's run loop.
    fn wake_by_ref(self: &Rc<Self>);
}

struct Vtable<T>(T);

impl<T: RcWake> Vtable<T> {
    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        clone_raw::<T>,
        wake_raw::<T>,
        wake_by_ref_raw::<T>,
        drop_raw::<T>,
    );
}

unsafe fn clone_raw<T: RcWake>(data: *const ()) -> RawWaker {
    let rc = ManuallyDrop::new(Rc::from_raw(data.cast::<T>()));
    let cloned = Rc::clone(&rc);
    RawWaker::new(Rc::into_raw(cloned).cast(), &Vtable::<T>::VTABLE)
}

unsafe fn wake_raw<T: RcWake>(data: *const ()) {
    let rc = Rc::from_raw(data.cast::<T>());
    RcWake::wake_by_ref(&rc);
}

unsafe fn wake_by_ref_raw<T: RcWake>(data: *const ()) {
    let rc = ManuallyDrop::new(Rc::from_raw(data.cast::<T>()));
    RcWake::wake_by_ref(&rc);
}

unsafe fn drop_raw<T: RcWake>(data: *const ()) {
    drop(Rc::from_raw(data.cast::<T>()));
}

/// Builds a [`Waker`] whose wakes call `RcWake::wake_by_ref` on `rc`.
pub(crate) fn rc_waker<T: RcWake>(rc: Rc<T>) -> Waker {
    let raw = RawWaker::new(Rc::into_raw(rc).cast(), &Vtable::<T>::VTABLE);
    // SAFETY: the vtable upholds the RawWaker contract over Rc clones;
    // single-threaded use is guaranteed by the runtime's design.
    unsafe { Waker::from_raw(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Flag(Cell<u32>);

    impl RcWake for Flag {
        fn wake_by_ref(self: &Rc<Self>) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn clones_share_identity() {
        let waker = rc_waker(Rc::new(Flag(Cell::new(0))));
        let clone = waker.clone();
        assert!(waker.will_wake(&clone));
    }

    #[test]
    fn wake_by_ref_reaches_the_target() {
        let flag = Rc::new(Flag(Cell::new(0)));
        let waker = rc_waker(Rc::clone(&flag));
        waker.wake_by_ref();
        waker.clone().wake();
        assert_eq!(flag.0.get(), 2);
        assert_eq!(Rc::strong_count(&flag), 2, "waker still holds one ref");
    }
}
