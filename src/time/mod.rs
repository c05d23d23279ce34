//! Timers: the deadline queue driving the loop's wake times, and sleep
//! futures layered on it.

pub mod queue;
mod sleep;

pub use queue::{poll_timeout, TimerQueue};
pub use sleep::{sleep, sleep_until, Sleep};
