//! Process shutdown handle shared by signal handling and the `exit_server` tool.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cloneable shutdown trigger carrying the requested exit code.
///
/// The first request wins; later requests keep the original code.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    requested: Arc<AtomicBool>,
    code: Arc<AtomicI32>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the transports watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn request(&self, code: i32) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        self.code.store(code, Ordering::SeqCst);
        info!(code, "Shutdown requested");
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Exit code of the first request, 0 when none was made.
    pub fn exit_code(&self) -> i32 {
        self.code.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_sets_code_and_cancels() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();
        assert!(!shutdown.is_requested());
        assert_eq!(shutdown.exit_code(), 0);

        shutdown.clone().request(3);
        assert!(token.is_cancelled());
        assert_eq!(shutdown.exit_code(), 3);

        shutdown.request(9);
        assert_eq!(shutdown.exit_code(), 3);
    }
}
