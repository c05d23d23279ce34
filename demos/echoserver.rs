//! Line echo server: accepts connections and echoes every line back.

use clap::Parser;
use tracing::{error, info};

use riptide::io::{ByteWriter, LineReader};
use riptide::net::{parse_addr, TcpListener};
use riptide::reactor::Poller;
use riptide::runtime::{EventLoop, Spawner};
use riptide::{NetInit, Result};

#[derive(Parser)]
#[command(about = "riptide line echo server")]
struct Opts {
    /// Port to listen on.
    #[arg(long, default_value_t = 8888)]
    port: u16,

    /// Reactor backend: select|poll|epoll|kqueue|uring.
    #[arg(long, default_value = "select")]
    method: String,

    /// Verbose tracing to stderr.
    #[arg(long)]
    debug: bool,
}

fn serve<P: Poller + 'static>(poller: P, port: u16) -> Result<()> {
    let lp = EventLoop::new(poller);
    let spawner = lp.spawner();
    let poller = lp.poller().clone();

    lp.run_until(async move {
        let listener = TcpListener::bind(&poller, parse_addr("127.0.0.1", port)?)?;
        info!(port, "echo server up");
        loop {
            let stream = listener.accept().await?;
            spawner.spawn(async move {
                let peer = stream.peer_addr();
                info!(?peer, "client connected");
                let mut read_half = &stream;
                let mut write_half = &stream;
                let mut reader = LineReader::new(&mut read_half, 4096);
                let mut writer = ByteWriter::new(&mut write_half);
                loop {
                    match reader.read().await {
                        Ok(Some(line)) => {
                            let echo = line.to_vec();
                            if let Err(e) = writer.write_all(&echo).await {
                                error!(?peer, "write failed: {e}");
                                break;
                            }
                        }
                        Ok(None) => {
                            info!(?peer, "client disconnected");
                            break;
                        }
                        Err(e) => {
                            error!(?peer, "read failed: {e}");
                            break;
                        }
                    }
                }
            });
        }
    })
}

fn main() {
    let opts = Opts::parse();
    let _init = NetInit::new();
    tracing_subscriber::fmt()
        .with_max_level(if opts.debug {
            tracing::Level::TRACE
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let outcome = match opts.method.as_str() {
        "select" => serve(riptide::reactor::SelectPoller::new().unwrap(), opts.port),
        "poll" => serve(riptide::reactor::PollPoller::new().unwrap(), opts.port),
        #[cfg(target_os = "linux")]
        "epoll" => serve(riptide::reactor::EpollPoller::new().unwrap(), opts.port),
        #[cfg(target_os = "linux")]
        "uring" => serve(riptide::reactor::UringPoller::new().unwrap(), opts.port),
        #[cfg(any(target_os = "macos", target_os = "freebsd"))]
        "kqueue" => serve(riptide::reactor::KqueuePoller::new().unwrap(), opts.port),
        _ => {
            eprintln!("Unknown method");
            std::process::exit(1);
        }
    };
    if let Err(e) = outcome {
        error!("server failed: {e}");
        std::process::exit(1);
    }
}
