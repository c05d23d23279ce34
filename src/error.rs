//! Error types shared across the runtime.
//!
//! Every fallible operation in the crate resolves to [`Result`]. Errors are
//! surfaced to the awaiter of the operation that hit them; nothing in the
//! core logs or swallows an error on the caller's behalf.

use std::io;

/// The error type returned by runtime operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A textual address could not be parsed as IPv4, IPv6, or empty.
    #[error("invalid address")]
    InvalidAddress,

    /// A syscall failed; carries the raw OS error code.
    #[error("os error {0}")]
    Os(i32),

    /// A deadline elapsed before the operation completed.
    #[error("operation timed out")]
    TimedOut,

    /// The peer closed the stream while more bytes were required.
    #[error("unexpected end of stream")]
    Eof,

    /// The TLS engine reported a failure.
    #[error("tls: {0}")]
    Tls(String),

    /// The resolver exhausted its nameservers for this name.
    #[error("name resolution failed for {0:?}")]
    ResolveFailed(String),

    /// The operation was cancelled before completion.
    #[error("cancelled")]
    Cancelled,

    /// The socket was already closed.
    #[error("socket closed")]
    Closed,
}

impl Error {
    /// Returns the raw OS error code, if this is an [`Error::Os`].
    #[must_use]
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Os(code) => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this error is a deadline expiry.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::UnexpectedEof => Self::Eof,
            _ => match e.raw_os_error() {
                Some(code) if code == libc::ETIMEDOUT => Self::TimedOut,
                Some(code) => Self::Os(code),
                None => Self::Os(libc::EIO),
            },
        }
    }
}

/// A specialized `Result` for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_maps_to_os_code() {
        let err: Error = io::Error::from_raw_os_error(libc::ECONNREFUSED).into();
        assert_eq!(err.os_code(), Some(libc::ECONNREFUSED));
    }

    #[test]
    fn timed_out_kinds_collapse() {
        let from_kind: Error = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(from_kind.is_timed_out());

        let from_code: Error = io::Error::from_raw_os_error(libc::ETIMEDOUT).into();
        assert!(from_code.is_timed_out());
    }

    #[test]
    fn display_names_the_failure() {
        assert_eq!(Error::InvalidAddress.to_string(), "invalid address");
        assert_eq!(
            Error::ResolveFailed("bad.host".into()).to_string(),
            "name resolution failed for \"bad.host\""
        );
    }
}
