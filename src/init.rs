//! Process-wide network initialization.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

/// Guard owning process-wide network setup.
///
/// On POSIX this ignores `SIGPIPE` so writes to a reset connection surface
/// as `EPIPE` from the syscall instead of terminating the process.
/// Constructing more than one `NetInit` is a no-op; the underlying setup
/// runs once per process.
#[derive(Debug)]
pub struct NetInit(());

impl NetInit {
    /// Performs process-wide setup (idempotent).
    #[must_use]
    pub fn new() -> Self {
        INIT.get_or_init(|| {
            // SAFETY: installing SIG_IGN for SIGPIPE has no preconditions.
            unsafe {
                libc::signal(libc::SIGPIPE, libc::SIG_IGN);
            }
        });
        Self(())
    }
}

impl Default for NetInit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_init_is_noop() {
        let _a = NetInit::new();
        let _b = NetInit::new();
    }
}
