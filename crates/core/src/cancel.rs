//! Cooperative cancellation flag shared between the scheduler and a run

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ExportError;

/// Cancellation flag for one export run.
///
/// The scheduler flips it on `stop()`; phases observe it at item boundaries
/// via [`CancelFlag::check`]. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the in-flight item finishes as a unit.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Raise [`ExportError::Stopped`] if cancellation was requested.
    pub fn check(&self) -> Result<(), ExportError> {
        if self.is_cancelled() {
            Err(ExportError::Stopped)
        } else {
            Ok(())
        }
    }
}
