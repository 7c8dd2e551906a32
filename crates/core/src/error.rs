//! Error taxonomy for export runs.
//!
//! Three kinds abort a whole phase (`FolderDoesNotExist`, `Stopped`,
//! `RecordUpdateFailed`); everything else is a per-item failure that the
//! materializer logs, counts, and skips.

use crate::model::CollectionId;

/// Errors surfaced by the export engine and its ports
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The chosen export folder vanished from disk
    #[error("export folder does not exist")]
    FolderDoesNotExist,

    /// Cooperative cancellation was observed at an item boundary
    #[error("export stopped")]
    Stopped,

    /// The journal could not be persisted; the in-memory copy was not updated
    #[error("failed to update export record")]
    RecordUpdateFailed,

    /// The journal file exists but is not valid JSON, even after a retry
    #[error("export record is not valid JSON: {0}")]
    RecordParse(String),

    /// The user dismissed the directory picker
    #[error("folder selection aborted")]
    SelectFolderAborted,

    /// A collection slated for removal still has exported file entries
    #[error("collection {0} still has exported files")]
    CollectionNotEmpty(CollectionId),

    /// The downloader failed to produce a stream for a file
    #[error("download failed: {0}")]
    Download(String),

    /// A live-photo blob could not be split into its image and video parts
    #[error("live photo decode failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Whether this error aborts the current phase rather than the current
    /// item.
    #[must_use]
    pub fn is_phase_fatal(&self) -> bool {
        matches!(
            self,
            Self::FolderDoesNotExist | Self::Stopped | Self::RecordUpdateFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(ExportError::FolderDoesNotExist.is_phase_fatal());
        assert!(ExportError::Stopped.is_phase_fatal());
        assert!(ExportError::RecordUpdateFailed.is_phase_fatal());
        assert!(!ExportError::Download("timeout".into()).is_phase_fatal());
        assert!(!ExportError::CollectionNotEmpty(3).is_phase_fatal());
    }
}
