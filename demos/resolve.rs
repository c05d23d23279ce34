//! Resolver demo: looks up each name given on the command line.

use clap::Parser;

use riptide::dns::Resolver;
use riptide::reactor::Poller;
use riptide::runtime::EventLoop;
use riptide::NetInit;

#[derive(Parser)]
#[command(about = "riptide dns resolver")]
struct Opts {
    /// Reactor backend: select|poll|epoll|kqueue|uring.
    #[arg(long, default_value = "poll")]
    method: String,

    /// Verbose tracing to stderr.
    #[arg(long)]
    debug: bool,

    /// Names to resolve.
    #[arg(required = true)]
    names: Vec<String>,
}

fn run<P: Poller + 'static>(poller: P, names: Vec<String>) {
    let lp = EventLoop::new(poller);
    let poller = lp.poller().clone();
    lp.run_until(async move {
        let resolver = Resolver::new(&poller);
        for name in names {
            match resolver.resolve(&name).await {
                Ok(addrs) => {
                    let list: Vec<String> = addrs.iter().map(ToString::to_string).collect();
                    println!("'{name}': {}", list.join(", "));
                }
                Err(e) => println!("'{name}': {e}"),
            }
        }
    });
}

fn main() {
    let opts = Opts::parse();
    let _init = NetInit::new();
    tracing_subscriber::fmt()
        .with_max_level(if opts.debug {
            tracing::Level::TRACE
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    match opts.method.as_str() {
        "select" => run(riptide::reactor::SelectPoller::new().unwrap(), opts.names),
        "poll" => run(riptide::reactor::PollPoller::new().unwrap(), opts.names),
        #[cfg(target_os = "linux")]
        "epoll" => run(riptide::reactor::EpollPoller::new().unwrap(), opts.names),
        #[cfg(target_os = "linux")]
        "uring" => run(riptide::reactor::UringPoller::new().unwrap(), opts.names),
        #[cfg(any(target_os = "macos", target_os = "freebsd"))]
        "kqueue" => run(riptide::reactor::KqueuePoller::new().unwrap(), opts.names),
        _ => {
            eprintln!("Unknown method");
            std::process::exit(1);
        }
    }
}
