//! Cooperative cancellation handle (spec.md §5).
//!
//! Polled inside the transfer loop at every chunk boundary, and
//! best-effort at a handful of other suspension points (TLS handshake,
//! control-channel read). A plain `AtomicBool` is enough for this: there
//! is no need to pull in `tokio-util`'s `CancellationToken` for a single
//! flag with no hierarchical cancellation or wakeup fan-out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle a caller keeps to cancel an in-progress operation on a
/// `FtpClient`. Cloning shares the same underlying flag.
#[derive(Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Reset for reuse across operations on the same client.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
