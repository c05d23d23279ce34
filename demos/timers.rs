//! Ticking timer demo: prints a counter every 10 ms.

use riptide::reactor::SelectPoller;
use riptide::runtime::EventLoop;
use riptide::time::sleep;
use std::time::Duration;

fn main() {
    let lp = EventLoop::new(SelectPoller::new().unwrap());
    let poller = lp.poller().clone();
    lp.run_until(async move {
        let mut i = 0u64;
        loop {
            sleep(&poller, Duration::from_millis(10)).await;
            println!("Ok {i}");
            i += 1;
        }
    })
}
