//! Cooperative cancellation shared between signal handlers and the run.
//!
//! The token is polled between listings, between resources and while waiting
//! on a child `kubectl` process. Backup plus delete of one resource is never
//! interrupted halfway.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::errors::{ReclaimError, Result};

/// Clonable cancellation flag.
///
/// `Ordering::Relaxed` is enough: the flag carries no data and is polled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token wired to SIGINT and SIGTERM.
    ///
    /// Registration is best-effort; failures are reported on stderr.
    #[cfg(feature = "signals")]
    #[must_use]
    pub fn with_signal_hooks() -> Self {
        use signal_hook::consts::{SIGINT, SIGTERM};

        let token = Self::new();
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&token.flag)) {
            eprintln!("[SR-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&token.flag)) {
            eprintln!("[SR-SIGNAL] failed to register SIGINT: {e}");
        }
        token
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ReclaimError::Cancelled { stage });
        }
        Ok(())
    }
}
