//! TLS echo client: sends lines over TLS and prints the replies.
//!
//! Talks to any TLS echo server; certificate verification is skipped so
//! self-signed test servers work out of the box.

use clap::Parser;
use tracing::error;

use riptide::io::{ByteReader, ByteWriter};
use riptide::net::parse_addr;
use riptide::reactor::Poller;
use riptide::runtime::EventLoop;
use riptide::tls::TlsConnector;
use riptide::{NetInit, Result};

#[derive(Parser)]
#[command(about = "riptide tls echo client")]
struct Opts {
    /// Server port.
    #[arg(long, default_value_t = 8888)]
    port: u16,

    /// Reactor backend: select|poll|epoll|kqueue|uring.
    #[arg(long, default_value = "select")]
    method: String,

    /// Verbose tracing to stderr (includes TLS traffic traces).
    #[arg(long)]
    debug: bool,

    /// Lines to send.
    #[arg(default_values_t = [String::from("hello riptide")])]
    messages: Vec<String>,
}

fn run<P: Poller + 'static>(poller: P, opts: &Opts) -> Result<()> {
    let lp = EventLoop::new(poller);
    let poller = lp.poller().clone();
    let port = opts.port;
    let messages = opts.messages.clone();

    lp.run_until(async move {
        let connector = TlsConnector::insecure();
        let addr = parse_addr("127.0.0.1", port)?;
        let mut tls = connector.connect(&poller, addr, "localhost").await?;

        for message in messages {
            let line = format!("{message}\n");
            ByteWriter::new(&mut tls).write_all(line.as_bytes()).await?;
            let mut echo = vec![0u8; line.len()];
            ByteReader::new(&mut tls).read_exact(&mut echo).await?;
            print!("received: {}", String::from_utf8_lossy(&echo));
        }
        Ok(())
    })
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

    let outcome = match opts.method.as_str() {
        "select" => run(riptide::reactor::SelectPoller::new().unwrap(), &opts),
        "poll" => run(riptide::reactor::PollPoller::new().unwrap(), &opts),
        #[cfg(target_os = "linux")]
        "epoll" => run(riptide::reactor::EpollPoller::new().unwrap(), &opts),
        #[cfg(target_os = "linux")]
        "uring" => run(riptide::reactor::UringPoller::new().unwrap(), &opts),
        #[cfg(any(target_os = "macos", target_os = "freebsd"))]
        "kqueue" => run(riptide::reactor::KqueuePoller::new().unwrap(), &opts),
        _ => {
            eprintln!("Unknown method");
            std::process::exit(1);
        }
    };
    if let Err(e) = outcome {
        error!("client failed: {e}");
        std::process::exit(1);
    }
}
