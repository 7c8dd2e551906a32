//! Progress/UI observer contract

use crate::journal::ExportStage;
use crate::model::RemoteFile;

/// Counters for the file-export phase of the current run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportProgress {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Receives run updates. All methods default to no-ops so implementors
/// override only what they render.
pub trait ExportObserver: Send + Sync {
    fn on_stage(&self, _stage: ExportStage) {}

    /// Broadcast after every processed item in the export phase.
    fn on_progress(&self, _progress: ExportProgress) {}

    /// Epoch milliseconds of the completed attempt.
    fn on_last_export(&self, _epoch_ms: i64) {}

    /// Personal files not yet present in the journal.
    fn on_pending_exports(&self, _pending: &[RemoteFile]) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExportObserver for NoopObserver {}
