//! Timer ordering and combinator semantics across backends.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use riptide::combinator::{all, any, FutureExt};
use riptide::time::{sleep, sleep_until};
use riptide::{Error, Result};

macro_rules! timer_suite {
    ($name:ident, $poller:ty) => {
        mod $name {
            use super::*;
            use riptide::reactor::Poller;
            use riptide::runtime::EventLoop;

            type Backend = $poller;

            fn lp() -> EventLoop<Backend> {
                EventLoop::new(Backend::new().unwrap())
            }

            async fn delayed(
                poller: std::rc::Rc<Backend>,
                ms: u64,
                value: i32,
            ) -> i32 {
                sleep(&poller, Duration::from_millis(ms)).await;
                value
            }

            #[test]
            fn sleep_completes_no_earlier_than_asked() {
                let lp = lp();
                let poller = lp.poller().clone();
                let timeout = Duration::from_millis(100);
                let started = Instant::now();
                lp.run_until(async move {
                    sleep(&poller, timeout).await;
                });
                assert!(started.elapsed() >= timeout);
            }

            #[test]
            fn sleeps_fire_in_deadline_order() {
                let lp = lp();
                let poller = lp.poller().clone();
                let counter = Rc::new(Cell::new(0));

                let (c1, p1) = (Rc::clone(&counter), poller.clone());
                let h1 = lp.spawn(async move {
                    sleep(&p1, Duration::from_millis(100)).await;
                    c1.set(c1.get() + 1);
                    c1.get()
                });
                let (c2, p2) = (Rc::clone(&counter), poller.clone());
                let h2 = lp.spawn(async move {
                    sleep(&p2, Duration::from_millis(200)).await;
                    c2.set(c2.get() + 1);
                    c2.get()
                });

                let (v1, v2) = lp.run_until(async move { (h1.await, h2.await) });
                assert_eq!(v1, 1);
                assert_eq!(v2, 2);
                assert_eq!(counter.get(), 2);
            }

            #[test]
            fn any_completes_on_first_sleep() {
                let lp = lp();
                let poller = lp.poller().clone();
                let done = lp.run_until(async move {
                    let futures = vec![
                        delayed(poller.clone(), 100, 0),
                        delayed(poller.clone(), 200, 0),
                        delayed(poller.clone(), 201, 0),
                        delayed(poller.clone(), 202, 0),
                    ];
                    any(futures).await;
                    true
                });
                assert!(done);
                assert_eq!(lp.poller().timers(), 0, "losing sleeps must cancel");
            }

            #[test]
            fn any_returns_the_first_value() {
                let lp = lp();
                let poller = lp.poller().clone();
                let winner = lp.run_until(async move {
                    any(vec![
                        delayed(poller.clone(), 204, 1),
                        delayed(poller.clone(), 100, 2),
                        delayed(poller.clone(), 201, 3),
                        delayed(poller.clone(), 202, 4),
                    ])
                    .await
                });
                assert_eq!(winner, 2);
                assert_eq!(lp.poller().timers(), 0);
            }

            #[test]
            fn any_cancels_same_tick_losers_before_they_run() {
                let lp = lp();
                let poller = lp.poller().clone();
                let ok = Rc::new(Cell::new(0u32));

                async fn tick(
                    poller: std::rc::Rc<Backend>,
                    until: Instant,
                    ok: Rc<Cell<u32>>,
                ) {
                    sleep_until(&poller, until).await;
                    ok.set(ok.get() + 1);
                }

                let observed = Rc::clone(&ok);
                let final_count = lp.run_until(async move {
                    let until = Instant::now() + Duration::from_millis(100);
                    any(vec![
                        tick(poller.clone(), until, Rc::clone(&observed)),
                        tick(poller.clone(), until, Rc::clone(&observed)),
                        tick(poller.clone(), until, Rc::clone(&observed)),
                        tick(poller.clone(), until, Rc::clone(&observed)),
                    ])
                    .await;
                    observed.set(observed.get() + 1);
                    observed.get()
                });

                assert_eq!(final_count, 2, "exactly one sleeper plus the aggregate");
                assert_eq!(lp.poller().timers(), 0);
            }

            #[test]
            fn all_keeps_input_order() {
                let lp = lp();
                async fn ready(value: i32) -> Result<i32> {
                    Ok(value)
                }
                let values = lp
                    .run_until(async move {
                        all(vec![ready(1), ready(2), ready(3), ready(4)]).await
                    })
                    .unwrap();
                assert_eq!(values, vec![1, 2, 3, 4]);
            }

            #[test]
            fn all_fails_fast_on_first_error() {
                let lp = lp();
                let poller = lp.poller().clone();

                async fn child(
                    poller: std::rc::Rc<Backend>,
                    ms: u64,
                    outcome: Result<i32>,
                ) -> Result<i32> {
                    sleep(&poller, Duration::from_millis(ms)).await;
                    outcome
                }

                let err = lp
                    .run_until(async move {
                        all(vec![
                            child(poller.clone(), 10, Err(Error::Eof)),
                            child(poller.clone(), 500, Ok(2)),
                        ])
                        .await
                    })
                    .unwrap_err();
                assert_eq!(err, Error::Eof);
                assert_eq!(lp.poller().timers(), 0, "pending siblings must cancel");
            }

            #[test]
            fn map_transforms_lazily() {
                let lp = lp();
                let value = lp.run_until(async { 1 }.map(|v| f64::from(v) * 1.5));
                assert!((value - 1.5).abs() < 1e-13);
            }
        }
    };
}

timer_suite!(select, riptide::reactor::SelectPoller);
timer_suite!(poll, riptide::reactor::PollPoller);
#[cfg(target_os = "linux")]
timer_suite!(epoll, riptide::reactor::EpollPoller);
#[cfg(target_os = "linux")]
timer_suite!(uring, riptide::reactor::UringPoller);
#[cfg(any(target_os = "macos", target_os = "freebsd"))]
timer_suite!(kqueue, riptide::reactor::KqueuePoller);
