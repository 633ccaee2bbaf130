//! Cooperative cancellation between the host and the program thread.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// The host asked the program to stop.
///
/// Every blocking engine call starts returning this once shutdown has been
/// requested; the program propagates it with `?` and unwinds out of its
/// main function.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("interrupted by the host")]
pub struct Interrupted;

/// Result of program-facing calls that observe cancellation.
pub type GlkResult<T> = Result<T, Interrupted>;

/// One-way flag flipped by the host. The program never blocks on it; it
/// checks at every blocking call and at explicit yield points.
#[derive(Debug, Default)]
pub(crate) struct CancellationToken {
    fired: AtomicBool,
}

impl CancellationToken {
    pub(crate) fn cancel(&self) {
        self.fired.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::Relaxed)
    }

    /// Re-arms the token so the session can host another program.
    pub(crate) fn reset(&self) {
        self.fired.store(false, Ordering::Relaxed);
    }

    /// Observation point for the program thread.
    pub(crate) fn checkpoint(&self) -> GlkResult<()> {
        if self.is_cancelled() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}
