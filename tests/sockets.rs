//! Socket behavior across every reactor backend.

use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use riptide::io::{ByteReader, ByteWriter};
use riptide::net::parse_addr;
use riptide::reactor::Poller;
use riptide::time::sleep;
use riptide::Error;

fn loopback(port: u16) -> SocketAddr {
    parse_addr("127.0.0.1", port).unwrap()
}

/// Binds and immediately frees a port, leaving it very likely unused.
fn unused_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn cyclic_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}

macro_rules! socket_suite {
    ($name:ident, $poller:ty) => {
        mod $name {
            use super::*;
            use riptide::net::{TcpListener, TcpStream};
            use riptide::runtime::EventLoop;

            type Backend = $poller;

            fn lp() -> EventLoop<Backend> {
                EventLoop::new(Backend::new().unwrap())
            }

            #[test]
            fn listen() {
                let lp = lp();
                let listener = TcpListener::bind(lp.poller(), loopback(0)).unwrap();
                assert_eq!(listener.state(), riptide::net::SocketState::Listening);
            }

            #[test]
            fn accept_fills_peer_addr() {
                let lp = lp();
                let poller = lp.poller().clone();
                let listener = TcpListener::bind(&poller, loopback(0)).unwrap();
                let addr = listener.local_addr().unwrap();

                let server = lp.spawn(async move {
                    let accepted = listener.accept().await.unwrap();
                    accepted.peer_addr().unwrap().ip()
                });
                let client_poller = poller.clone();
                let client = lp.spawn(async move {
                    TcpStream::connect(&client_poller, addr).await.unwrap()
                });

                let (peer_ip, _stream) =
                    lp.run_until(async move { (server.await, client.await) });
                assert_eq!(peer_ip, addr.ip());
            }

            #[test]
            fn write_after_connect() {
                let lp = lp();
                let poller = lp.poller().clone();
                let listener = TcpListener::bind(&poller, loopback(0)).unwrap();
                let addr = listener.local_addr().unwrap();
                let message = *b"Hello";

                let client_poller = poller.clone();
                let writer = lp.spawn(async move {
                    let stream = TcpStream::connect(&client_poller, addr).await.unwrap();
                    stream.write_some(&message).await.unwrap();
                });
                let reader = lp.spawn(async move {
                    let mut stream = listener.accept().await.unwrap();
                    let mut buf = [0u8; 5];
                    ByteReader::new(&mut stream)
                        .read_exact(&mut buf)
                        .await
                        .unwrap();
                    buf
                });

                let (_, received) = lp.run_until(async move { (writer.await, reader.await) });
                assert_eq!(received, message);
            }

            #[test]
            fn write_after_accept() {
                let lp = lp();
                let poller = lp.poller().clone();
                let listener = TcpListener::bind(&poller, loopback(0)).unwrap();
                let addr = listener.local_addr().unwrap();
                let message = *b"Hello";

                let client_poller = poller.clone();
                let reader = lp.spawn(async move {
                    let mut stream = TcpStream::connect(&client_poller, addr).await.unwrap();
                    let mut buf = [0u8; 5];
                    ByteReader::new(&mut stream)
                        .read_exact(&mut buf)
                        .await
                        .unwrap();
                    buf
                });
                let writer = lp.spawn(async move {
                    let stream = listener.accept().await.unwrap();
                    stream.write_some(&message).await.unwrap();
                    stream
                });

                let (received, _stream) =
                    lp.run_until(async move { (reader.await, writer.await) });
                assert_eq!(received, message);
            }

            #[test]
            fn read_write_same_socket_with_yield() {
                let lp = lp();
                let poller = lp.poller().clone();
                let listener = TcpListener::bind(&poller, loopback(0)).unwrap();
                let addr = listener.local_addr().unwrap();

                let server = lp.spawn(async move {
                    let stream = listener.accept().await.unwrap();
                    stream
                        .write_some_yield(b"Hello from server")
                        .await
                        .unwrap();
                    let mut buf = [0u8; 64];
                    let n = stream.read_some_yield(&mut buf).await.unwrap();
                    buf[..n].to_vec()
                });

                let client_poller = poller.clone();
                let client = Rc::new(
                    lp.run_until(TcpStream::connect(&client_poller, addr)).unwrap(),
                );

                let tx = Rc::clone(&client);
                let sender = lp.spawn(async move {
                    tx.write_some_yield(b"Hello from client").await.unwrap();
                });
                let rx = Rc::clone(&client);
                let receiver = lp.spawn(async move {
                    let mut buf = [0u8; 64];
                    let n = rx.read_some_yield(&mut buf).await.unwrap();
                    buf[..n].to_vec()
                });

                let (from_client, (), from_server) = lp.run_until(async move {
                    (server.await, sender.await, receiver.await)
                });
                assert_eq!(from_client, b"Hello from client");
                assert_eq!(from_server, b"Hello from server");
            }

            #[test]
            fn connection_timeout() {
                let lp = lp();
                let poller = lp.poller().clone();
                let started = Instant::now();

                let err = lp
                    .run_until(async move {
                        TcpStream::connect_deadline(
                            &poller,
                            parse_addr("10.0.0.1", 19999).unwrap(),
                            Some(Instant::now() + Duration::from_millis(100)),
                        )
                        .await
                    })
                    .unwrap_err();

                assert!(started.elapsed() < Duration::from_secs(5));
                // Routed environments may reject the blackhole address
                // outright instead of dropping packets.
                assert!(
                    err.is_timed_out()
                        || matches!(
                            err.os_code(),
                            Some(libc::EHOSTUNREACH | libc::ENETUNREACH)
                        ),
                    "unexpected error: {err:?}"
                );
            }

            #[test]
            fn met_deadline_leaves_no_timer() {
                let lp = lp();
                let poller = lp.poller().clone();
                let listener = TcpListener::bind(&poller, loopback(0)).unwrap();
                let addr = listener.local_addr().unwrap();

                let accept = lp.spawn(async move { listener.accept().await.unwrap() });
                let client_poller = poller.clone();
                let outcome = lp.run_until(async move {
                    let stream = TcpStream::connect_deadline(
                        &client_poller,
                        addr,
                        Some(Instant::now() + Duration::from_millis(10_000)),
                    )
                    .await?;
                    sleep(&client_poller, Duration::from_millis(100)).await;
                    accept.await;
                    Ok::<_, Error>(stream)
                });

                assert!(outcome.is_ok(), "connect within deadline: {outcome:?}");
                assert_eq!(lp.poller().timers(), 0, "connect deadline must be gone");
            }

            #[test]
            fn connection_refused_on_write() {
                let lp = lp();
                let poller = lp.poller().clone();
                let port = unused_port();

                let err = lp
                    .run_until(async move {
                        let stream = TcpStream::connect_deadline(
                            &poller,
                            loopback(port),
                            Some(Instant::now() + Duration::from_millis(100)),
                        )
                        .await?;
                        stream.write_some(b"test").await?;
                        Ok::<_, Error>(())
                    })
                    .unwrap_err();

                assert!(
                    err.is_timed_out()
                        || matches!(err.os_code(), Some(libc::ECONNREFUSED | libc::EPIPE)),
                    "unexpected error: {err:?}"
                );
            }

            #[test]
            fn connection_refused_on_read() {
                let lp = lp();
                let poller = lp.poller().clone();
                let port = unused_port();

                let err = lp
                    .run_until(async move {
                        let stream = TcpStream::connect_deadline(
                            &poller,
                            loopback(port),
                            Some(Instant::now() + Duration::from_millis(100)),
                        )
                        .await?;
                        let mut buf = [0u8; 4];
                        stream.read_some(&mut buf).await?;
                        Ok::<_, Error>(())
                    })
                    .unwrap_err();

                assert!(
                    err.is_timed_out() || err.os_code() == Some(libc::ECONNREFUSED),
                    "unexpected error: {err:?}"
                );
            }

            #[test]
            fn one_mebibyte_round_trip() {
                let lp = lp();
                let poller = lp.poller().clone();
                let listener = TcpListener::bind(&poller, loopback(0)).unwrap();
                let addr = listener.local_addr().unwrap();
                let data = cyclic_bytes(1024 * 1024);
                let sent = data.clone();

                let client_poller = poller.clone();
                let writer = lp.spawn(async move {
                    let mut stream =
                        TcpStream::connect(&client_poller, addr).await.unwrap();
                    ByteWriter::new(&mut stream).write_all(&sent).await.unwrap();
                });
                let reader = lp.spawn(async move {
                    let mut stream = listener.accept().await.unwrap();
                    let mut received = vec![0u8; 1024 * 1024];
                    ByteReader::new(&mut stream)
                        .read_exact(&mut received)
                        .await
                        .unwrap();
                    received
                });

                let (_, received) = lp.run_until(async move { (writer.await, reader.await) });
                assert_eq!(received, data);
            }

            #[test]
            fn monitor_sees_remote_disconnect() {
                let lp = lp();
                let poller = lp.poller().clone();
                let listener = TcpListener::bind(&poller, loopback(0)).unwrap();
                let addr = listener.local_addr().unwrap();

                let server = lp.spawn(async move {
                    let mut accepted = listener.accept().await.unwrap();
                    accepted.close();
                });
                let client_poller = poller.clone();
                let client = lp.spawn(async move {
                    let stream = TcpStream::connect(&client_poller, addr).await.unwrap();
                    stream.monitor().await.unwrap();
                    true
                });

                let (_, disconnected) =
                    lp.run_until(async move { (server.await, client.await) });
                assert!(disconnected);
            }
        }
    };
}

socket_suite!(select, riptide::reactor::SelectPoller);
socket_suite!(poll, riptide::reactor::PollPoller);
#[cfg(target_os = "linux")]
socket_suite!(epoll, riptide::reactor::EpollPoller);
#[cfg(target_os = "linux")]
socket_suite!(uring, riptide::reactor::UringPoller);
#[cfg(any(target_os = "macos", target_os = "freebsd"))]
socket_suite!(kqueue, riptide::reactor::KqueuePoller);
