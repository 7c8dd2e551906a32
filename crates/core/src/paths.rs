//! On-disk layout under the chosen export folder.
//!
//! ```text
//! <base>/Pixport Photos/
//!   export_status.json
//!   <CollectionDir>/
//!      <file basename>
//!      metadata/<file basename>.json
//!   Trash/
//!      <mirrors the structure of trashed items>
//! ```

use std::path::{Path, PathBuf};

/// Well-known subdirectory of the chosen folder that holds the mirror
pub const EXPORT_DIR_NAME: &str = "Pixport Photos";
/// Journal file name inside the export directory
pub const JOURNAL_FILE_NAME: &str = "export_status.json";
/// Trash tree for removed items
pub const TRASH_DIR_NAME: &str = "Trash";
/// Per-collection sidecar subdirectory
pub const METADATA_DIR_NAME: &str = "metadata";

/// Resolves every engine path from the user-chosen base folder
#[derive(Debug, Clone)]
pub struct ExportPaths {
    base: PathBuf,
}

impl ExportPaths {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The folder the user selected. Its disappearance aborts a run.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.base.join(EXPORT_DIR_NAME)
    }

    #[must_use]
    pub fn journal_file(&self) -> PathBuf {
        self.export_dir().join(JOURNAL_FILE_NAME)
    }

    #[must_use]
    pub fn trash_dir(&self) -> PathBuf {
        self.export_dir().join(TRASH_DIR_NAME)
    }

    #[must_use]
    pub fn collection_dir(&self, dir_name: &str) -> PathBuf {
        self.export_dir().join(dir_name)
    }

    #[must_use]
    pub fn metadata_dir(&self, dir_name: &str) -> PathBuf {
        self.collection_dir(dir_name).join(METADATA_DIR_NAME)
    }

    /// Sidecar path for a file, derived from the `(collection, basename)`
    /// pair rather than by splitting a joined path.
    #[must_use]
    pub fn sidecar_file(&self, dir_name: &str, basename: &str) -> PathBuf {
        self.metadata_dir(dir_name).join(format!("{basename}.json"))
    }

    #[must_use]
    pub fn file_path(&self, dir_name: &str, basename: &str) -> PathBuf {
        self.collection_dir(dir_name).join(basename)
    }

    /// Trash destination parent for items out of `dir_name`
    #[must_use]
    pub fn trash_collection_dir(&self, dir_name: &str) -> PathBuf {
        self.trash_dir().join(dir_name)
    }

    /// Trash destination parent for sidecars out of `dir_name`
    #[must_use]
    pub fn trash_metadata_dir(&self, dir_name: &str) -> PathBuf {
        self.trash_collection_dir(dir_name).join(METADATA_DIR_NAME)
    }
}
