//! The export journal (`export_status.json`).
//!
//! The journal is the sole source of truth for "has this file been
//! exported"; the presence of a path on disk never retroactively records
//! it. All mutations are serialized through a fair async mutex: each one
//! reads the current record, mutates a copy, atomically replaces the file,
//! and only then updates the in-memory copy. A mutation that fails to
//! persist leaves the in-memory record untouched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ExportError;
use crate::gateway::FsGateway;
use crate::model::{collection_id_from_uid, CollectionId};
use crate::paths::ExportPaths;

/// Current journal schema version
pub const JOURNAL_VERSION: u32 = 3;

/// Stage ladder of an export run, in execution order.
///
/// Within a run the stage only moves forward; it is reset to `INIT` only on
/// first creation of the journal or when the export folder vanishes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum ExportStage {
    #[default]
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "MIGRATION")]
    Migration,
    #[serde(rename = "STARTING")]
    Starting,
    #[serde(rename = "RENAMING_COLLECTION_FOLDERS")]
    RenamingCollectionFolders,
    #[serde(rename = "TRASHING_DELETED_FILES")]
    TrashingDeletedFiles,
    #[serde(rename = "EXPORTING_FILES")]
    ExportingFiles,
    #[serde(rename = "TRASHING_DELETED_COLLECTIONS")]
    TrashingDeletedCollections,
    #[serde(rename = "FINISHED")]
    Finished,
}

impl ExportStage {
    /// A run is in progress iff the stage is strictly between `INIT` and
    /// `FINISHED`.
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        Self::Init < self && self < Self::Finished
    }
}

/// On-disk name(s) recorded for one exported file.
///
/// Serialized untagged: a plain JSON string for a single file, an
/// `{"image", "video"}` object for a live photo. Classification is by
/// variant, never by sniffing whether a name parses as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportName {
    Single(String),
    LivePhoto { image: String, video: String },
}

impl ExportName {
    /// Every basename this entry occupies in its collection directory.
    #[must_use]
    pub fn basenames(&self) -> Vec<&str> {
        match self {
            Self::Single(name) => vec![name],
            Self::LivePhoto { image, video } => vec![image, video],
        }
    }
}

fn default_version() -> u32 {
    // Journals written before the version field existed are schema 1.
    1
}

/// Persisted journal document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub last_attempt_timestamp: Option<i64>,
    #[serde(default)]
    pub stage: ExportStage,
    #[serde(default)]
    pub file_export_names: BTreeMap<String, ExportName>,
    #[serde(default)]
    pub collection_export_names: BTreeMap<CollectionId, String>,
}

impl ExportRecord {
    /// Fresh journal at the current schema version, stage `INIT`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: JOURNAL_VERSION,
            last_attempt_timestamp: None,
            stage: ExportStage::Init,
            file_export_names: BTreeMap::new(),
            collection_export_names: BTreeMap::new(),
        }
    }

    /// Count of file entries that still live in collection `id`.
    #[must_use]
    pub fn files_in_collection(&self, id: CollectionId) -> usize {
        self.file_export_names
            .keys()
            .filter(|uid| collection_id_from_uid(uid) == Some(id))
            .count()
    }
}

impl Default for ExportRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of the journal; all mutations flow through it.
pub struct Journal {
    fs: Arc<dyn FsGateway>,
    paths: ExportPaths,
    record: Mutex<ExportRecord>,
}

impl Journal {
    /// Load the journal from disk, creating an empty one if the export root
    /// exists but the file does not.
    ///
    /// A file that fails to parse is retried once after one second; if it is
    /// still invalid, [`ExportError::RecordParse`] surfaces.
    pub async fn open(fs: Arc<dyn FsGateway>, paths: ExportPaths) -> Result<Self, ExportError> {
        if !fs.exists(paths.base()).await {
            return Err(ExportError::FolderDoesNotExist);
        }

        let file = paths.journal_file();
        let record = if fs.exists(&file).await {
            let text = fs.read_text_file(&file).await?;
            match serde_json::from_str::<ExportRecord>(&text) {
                Ok(record) => record,
                Err(first) => {
                    warn!(error = %first, "export record failed to parse, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    let text = fs.read_text_file(&file).await?;
                    serde_json::from_str::<ExportRecord>(&text)
                        .map_err(|e| ExportError::RecordParse(e.to_string()))?
                }
            }
        } else {
            let record = ExportRecord::new();
            let text = serde_json::to_string_pretty(&record)
                .map_err(|_| ExportError::RecordUpdateFailed)?;
            fs.check_exists_and_create_dir(&paths.export_dir()).await?;
            fs.save_file_to_disk(&file, &text).await?;
            record
        };

        Ok(Self {
            fs,
            paths,
            record: Mutex::new(record),
        })
    }

    async fn ensure_root(&self) -> Result<(), ExportError> {
        if self.fs.exists(self.paths.base()).await {
            Ok(())
        } else {
            Err(ExportError::FolderDoesNotExist)
        }
    }

    /// Current record, cloned out from under the lock.
    pub async fn snapshot(&self) -> Result<ExportRecord, ExportError> {
        self.ensure_root().await?;
        Ok(self.record.lock().await.clone())
    }

    /// Serialized read-mutate-persist-commit. The fair mutex gives
    /// concurrent callers a well-defined linear order.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ExportRecord) -> T + Send,
    ) -> Result<T, ExportError> {
        self.ensure_root().await?;
        let mut guard = self.record.lock().await;
        let mut next = guard.clone();
        let out = f(&mut next);

        let text =
            serde_json::to_string_pretty(&next).map_err(|_| ExportError::RecordUpdateFailed)?;
        self.fs
            .save_file_to_disk(&self.paths.journal_file(), &text)
            .await
            .map_err(|e| match e {
                ExportError::FolderDoesNotExist => e,
                _ => ExportError::RecordUpdateFailed,
            })?;

        *guard = next;
        Ok(out)
    }

    pub async fn set_stage(&self, stage: ExportStage) -> Result<(), ExportError> {
        self.mutate(|r| r.stage = stage).await
    }

    /// Reset the in-memory stage without touching disk. Only used when the
    /// export folder has vanished and there is nothing left to persist to.
    pub async fn reset_stage_local(&self) {
        self.record.lock().await.stage = ExportStage::Init;
    }

    pub async fn set_last_attempt(&self, epoch_ms: i64) -> Result<(), ExportError> {
        self.mutate(|r| r.last_attempt_timestamp = Some(epoch_ms))
            .await
    }

    pub async fn set_file_name(&self, uid: &str, name: ExportName) -> Result<(), ExportError> {
        self.mutate(|r| {
            r.file_export_names.insert(uid.to_string(), name);
        })
        .await
    }

    /// Remove a file entry, returning the prior value for rollback.
    pub async fn remove_file_name(&self, uid: &str) -> Result<Option<ExportName>, ExportError> {
        self.mutate(|r| r.file_export_names.remove(uid)).await
    }

    /// Record a collection's directory name, returning the prior name for
    /// rollback.
    pub async fn set_collection_name(
        &self,
        id: CollectionId,
        dir_name: &str,
    ) -> Result<Option<String>, ExportError> {
        self.mutate(|r| r.collection_export_names.insert(id, dir_name.to_string()))
            .await
    }

    pub async fn remove_collection_name(
        &self,
        id: CollectionId,
    ) -> Result<Option<String>, ExportError> {
        self.mutate(|r| r.collection_export_names.remove(&id)).await
    }

    /// Replace the whole record. Used by the migration runner after an
    /// upgrade pass.
    pub async fn replace(&self, record: ExportRecord) -> Result<(), ExportError> {
        self.mutate(|r| *r = record).await
    }
}
