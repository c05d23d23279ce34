//! Riptide: a single-threaded cooperative async I/O runtime.
//!
//! # Overview
//!
//! Riptide multiplexes network I/O through pluggable OS backends — the
//! readiness family (`select`, `poll`, `epoll`, `kqueue`) and the
//! completion family (`io_uring`) — behind one [`reactor::Poller`]
//! facade, and drives plain Rust futures over it with a FIFO,
//! cooperatively scheduled event loop. There is no thread pool, no work
//! stealing, and no atomics on the hot path: everything a loop owns is
//! touched only from its thread.
//!
//! # Module Structure
//!
//! - [`runtime`]: the event loop, task spawning, join handles
//! - [`reactor`]: the poller facade and the per-OS backends
//! - [`time`]: the timer queue and sleep futures
//! - [`combinator`]: `any`/`all`/`map` and task-introspection awaitables
//! - [`net`]: address parsing, TCP and UDP sockets with deadlines
//! - [`io`]: byte readers/writers, line splitters, record reader
//! - [`tls`]: TLS sessions over any byte stream (rustls-backed)
//! - [`dns`]: caching A/AAAA resolver with RFC 1035 codec
//! - [`error`]: the crate-wide error type
//! - [`init`]: process-wide network setup
//!
//! # Example
//!
//! ```no_run
//! use riptide::net::{parse_addr, TcpStream};
//! use riptide::reactor::SelectPoller;
//! use riptide::runtime::EventLoop;
//!
//! let lp = EventLoop::new(SelectPoller::new().unwrap());
//! let poller = lp.poller().clone();
//! let reply = lp.run_until(async move {
//!     let addr = parse_addr("127.0.0.1", 8888)?;
//!     let stream = TcpStream::connect(&poller, addr).await?;
//!     stream.write_some(b"ping").await?;
//!     let mut buf = [0u8; 64];
//!     let n = stream.read_some(&mut buf).await?;
//!     Ok::<_, riptide::Error>(buf[..n].to_vec())
//! });
//! # let _ = reply;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod combinator;
pub mod dns;
pub mod error;
pub mod init;
pub mod io;
pub mod net;
pub mod reactor;
pub mod runtime;
pub mod time;

#[cfg(feature = "tls")]
pub mod tls;

pub use error::{Error, Result};
pub use init::NetInit;
pub use runtime::{EventLoop, JoinHandle, Spawner};
