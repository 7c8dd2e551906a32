//! Journal schema upgrades.
//!
//! Runs before any reconciliation work; a failure here aborts the run.
//!
//! Layout history:
//! - **v1** wrote sidecars next to the files themselves
//!   (`<dir>/<basename>.json`); v2 moved them under `<dir>/metadata/`.
//! - **v2** recorded collection directories as paths; v3 records bare
//!   directory names.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ExportError;
use crate::gateway::FsGateway;
use crate::journal::{ExportRecord, Journal, JOURNAL_VERSION};
use crate::model::collection_id_from_uid;
use crate::paths::ExportPaths;

/// Upgrade the journal (and any affected on-disk artifacts) to the current
/// schema. No-op for journals already at [`JOURNAL_VERSION`].
pub async fn run(
    fs: &Arc<dyn FsGateway>,
    paths: &ExportPaths,
    journal: &Journal,
) -> Result<(), ExportError> {
    let mut record = journal.snapshot().await?;
    if record.version >= JOURNAL_VERSION {
        return Ok(());
    }
    info!(from = record.version, to = JOURNAL_VERSION, "migrating export record");

    if record.version < 2 {
        relocate_sidecars(fs, paths, &record).await?;
        record.version = 2;
    }
    if record.version < 3 {
        normalize_collection_dirs(&mut record);
        record.version = 3;
    }

    journal.replace(record).await
}

/// Final path component of a recorded collection value, tolerating both
/// bare names and the path-valued entries of older journals.
fn dir_name_of(recorded: &str) -> String {
    Path::new(recorded)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| recorded.to_string())
}

/// v1 → v2: move `<dir>/<basename>.json` sidecars under `<dir>/metadata/`.
async fn relocate_sidecars(
    fs: &Arc<dyn FsGateway>,
    paths: &ExportPaths,
    record: &ExportRecord,
) -> Result<(), ExportError> {
    for (uid, name) in &record.file_export_names {
        let Some(collection_id) = collection_id_from_uid(uid) else {
            continue;
        };
        let Some(recorded) = record.collection_export_names.get(&collection_id) else {
            continue;
        };
        let dir_name = dir_name_of(recorded);

        for basename in name.basenames() {
            let legacy = paths
                .collection_dir(&dir_name)
                .join(format!("{basename}.json"));
            if !fs.exists(&legacy).await {
                continue;
            }
            fs.check_exists_and_create_dir(&paths.metadata_dir(&dir_name))
                .await?;
            let target = paths.sidecar_file(&dir_name, basename);
            fs.move_file(&legacy, &target).await?;
            debug!(uid = %uid, sidecar = %target.display(), "relocated legacy sidecar");
        }
    }
    Ok(())
}

/// v2 → v3: collection entries become bare directory names.
fn normalize_collection_dirs(record: &mut ExportRecord) {
    for recorded in record.collection_export_names.values_mut() {
        *recorded = dir_name_of(recorded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::ExportName;
    use crate::testutil::MemFs;

    fn paths() -> ExportPaths {
        ExportPaths::new("/mirror")
    }

    async fn open_with_record(fs: &MemFs, record: &ExportRecord) -> Journal {
        fs.put_dir("/mirror");
        fs.put_file(
            paths().journal_file(),
            serde_json::to_string_pretty(record).unwrap(),
        );
        Journal::open(Arc::new(fs.clone()), paths()).await.unwrap()
    }

    #[tokio::test]
    async fn test_current_version_is_noop() {
        let fs = MemFs::new();
        let journal = open_with_record(&fs, &ExportRecord::new()).await;
        let before = journal.snapshot().await.unwrap();

        let fs_arc: Arc<dyn FsGateway> = Arc::new(fs);
        run(&fs_arc, &paths(), &journal).await.unwrap();
        assert_eq!(journal.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_v1_sidecars_move_under_metadata() {
        let fs = MemFs::new();
        let mut record = ExportRecord::new();
        record.version = 1;
        record.collection_export_names.insert(100, "Vacation".into());
        record
            .file_export_names
            .insert("1_100_1".into(), ExportName::Single("F1.jpg".into()));

        fs.put_file("/mirror/Pixport Photos/Vacation/F1.jpg", "bytes");
        fs.put_file("/mirror/Pixport Photos/Vacation/F1.jpg.json", "{}");

        let journal = open_with_record(&fs, &record).await;
        let fs_arc: Arc<dyn FsGateway> = Arc::new(fs.clone());
        run(&fs_arc, &paths(), &journal).await.unwrap();

        assert!(fs
            .contents(Path::new("/mirror/Pixport Photos/Vacation/metadata/F1.jpg.json"))
            .is_some());
        assert!(fs
            .contents(Path::new("/mirror/Pixport Photos/Vacation/F1.jpg.json"))
            .is_none());
        assert_eq!(journal.snapshot().await.unwrap().version, JOURNAL_VERSION);
    }

    #[tokio::test]
    async fn test_v2_collection_paths_become_names() {
        let fs = MemFs::new();
        let mut record = ExportRecord::new();
        record.version = 2;
        record
            .collection_export_names
            .insert(100, "/mirror/Pixport Photos/Vacation".into());

        let journal = open_with_record(&fs, &record).await;
        let fs_arc: Arc<dyn FsGateway> = Arc::new(fs.clone());
        run(&fs_arc, &paths(), &journal).await.unwrap();

        let migrated = journal.snapshot().await.unwrap();
        assert_eq!(
            migrated.collection_export_names.get(&100).map(String::as_str),
            Some("Vacation")
        );
        assert_eq!(migrated.version, JOURNAL_VERSION);
    }

    #[tokio::test]
    async fn test_versionless_journal_upgrades_from_v1() {
        let fs = MemFs::new();
        fs.put_dir("/mirror");
        // Hand-written journal predating the version field.
        fs.put_file(
            paths().journal_file(),
            r#"{"stage":"FINISHED","file_export_names":{},"collection_export_names":{}}"#,
        );
        let journal = Journal::open(Arc::new(fs.clone()), paths()).await.unwrap();
        assert_eq!(journal.snapshot().await.unwrap().version, 1);

        let fs_arc: Arc<dyn FsGateway> = Arc::new(fs);
        run(&fs_arc, &paths(), &journal).await.unwrap();
        assert_eq!(journal.snapshot().await.unwrap().version, JOURNAL_VERSION);
    }
}
