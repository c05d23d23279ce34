//! Socket primitives: address parsing, TCP, and UDP.

pub mod addr;
pub(crate) mod ready;
pub mod tcp;
pub mod udp;

pub use addr::parse_addr;
pub use tcp::{SocketState, TcpListener, TcpStream};
pub use udp::UdpSocket;

/// Errors worth retrying after the next readiness wake.
pub(crate) fn retryable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}
