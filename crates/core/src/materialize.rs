//! Executes an [`ExportPlan`] against the filesystem.
//!
//! Phases run in a fixed order: collection renames, then trashing of
//! removed files, then file exports, then removal of emptied collection
//! directories. Renames come first so new files land in correctly-named
//! directories; trashing precedes writing so reclaimed names are free
//! again; collection directories go last, after their files are drained.
//!
//! Every mutation is record-then-write: the journal entry lands before the
//! filesystem change it describes, and is rolled back if that change
//! fails. A crash therefore leaves at worst a journal entry with no disk
//! artifact, which the next run repairs, never an orphan file.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::error::ExportError;
use crate::gateway::{collect_stream, stream_from_bytes, ByteStream, FsGateway};
use crate::journal::{ExportName, ExportStage, Journal};
use crate::model::{collection_id_from_uid, Collection, CollectionId, FileKind, RemoteFile};
use crate::names;
use crate::observe::{ExportObserver, ExportProgress};
use crate::paths::ExportPaths;
use crate::plan::ExportPlan;
use crate::remote::{Downloader, ExifRewriter, LivePhotoDecoder, LivePhotoParts};
use crate::sidecar::Sidecar;

/// Per-run executor for the four plan phases
pub struct Materializer {
    fs: Arc<dyn FsGateway>,
    downloader: Arc<dyn Downloader>,
    exif: Arc<dyn ExifRewriter>,
    live: Arc<dyn LivePhotoDecoder>,
    paths: ExportPaths,
    observer: Arc<dyn ExportObserver>,
}

impl Materializer {
    #[must_use]
    pub fn new(
        fs: Arc<dyn FsGateway>,
        downloader: Arc<dyn Downloader>,
        exif: Arc<dyn ExifRewriter>,
        live: Arc<dyn LivePhotoDecoder>,
        paths: ExportPaths,
        observer: Arc<dyn ExportObserver>,
    ) -> Self {
        Self {
            fs,
            downloader,
            exif,
            live,
            paths,
            observer,
        }
    }

    /// Run all four phases of `plan` in order.
    ///
    /// # Errors
    /// Propagates the phase-fatal kinds (`FolderDoesNotExist`, `Stopped`,
    /// `UpdateExportedRecordFailed`) and `CollectionNotEmpty`; everything
    /// else is counted and skipped per item.
    pub async fn run(
        &self,
        journal: &Journal,
        plan: &ExportPlan,
        collections: &BTreeMap<CollectionId, Collection>,
        cancel: &CancelFlag,
    ) -> Result<ExportProgress, ExportError> {
        let mut progress = ExportProgress {
            total: plan.files_to_export.len(),
            ..ExportProgress::default()
        };

        self.enter_stage(journal, ExportStage::RenamingCollectionFolders)
            .await?;
        self.rename_collections(journal, &plan.renamed_collections, cancel)
            .await?;

        self.enter_stage(journal, ExportStage::TrashingDeletedFiles)
            .await?;
        self.trash_removed_files(journal, &plan.removed_file_uids, cancel)
            .await?;

        self.enter_stage(journal, ExportStage::ExportingFiles).await?;
        self.export_files(journal, &plan.files_to_export, collections, cancel, &mut progress)
            .await?;

        self.enter_stage(journal, ExportStage::TrashingDeletedCollections)
            .await?;
        self.remove_deleted_collections(journal, &plan.deleted_collections, cancel)
            .await?;

        Ok(progress)
    }

    async fn enter_stage(&self, journal: &Journal, stage: ExportStage) -> Result<(), ExportError> {
        journal.set_stage(stage).await?;
        self.observer.on_stage(stage);
        Ok(())
    }

    async fn ensure_root(&self) -> Result<(), ExportError> {
        if self.fs.exists(self.paths.base()).await {
            Ok(())
        } else {
            Err(ExportError::FolderDoesNotExist)
        }
    }

    // === Phase 1: collection renames ===

    async fn rename_collections(
        &self,
        journal: &Journal,
        renamed: &[Collection],
        cancel: &CancelFlag,
    ) -> Result<(), ExportError> {
        for collection in renamed {
            self.ensure_root().await?;
            cancel.check()?;
            if let Err(e) = self.rename_one(journal, collection).await {
                if e.is_phase_fatal() {
                    return Err(e);
                }
                warn!(collection = collection.id, error = %e, "collection rename failed, skipping");
            }
        }
        Ok(())
    }

    async fn rename_one(&self, journal: &Journal, collection: &Collection) -> Result<(), ExportError> {
        let record = journal.snapshot().await?;
        let Some(old_name) = record.collection_export_names.get(&collection.id).cloned() else {
            return Ok(());
        };

        let new_name =
            names::allocate(self.fs.as_ref(), &self.paths.export_dir(), &collection.name).await?;

        // The journal leads the filesystem: no on-disk directory may exist
        // that the journal doesn't know about.
        journal.set_collection_name(collection.id, &new_name).await?;
        let old_path = self.paths.collection_dir(&old_name);
        let new_path = self.paths.collection_dir(&new_name);
        if let Err(e) = self.fs.rename(&old_path, &new_path).await {
            journal.set_collection_name(collection.id, &old_name).await?;
            return Err(e);
        }

        info!(collection = collection.id, from = %old_name, to = %new_name, "renamed collection directory");
        Ok(())
    }

    // === Phase 2: trash removed files ===

    async fn trash_removed_files(
        &self,
        journal: &Journal,
        removed: &[String],
        cancel: &CancelFlag,
    ) -> Result<(), ExportError> {
        for uid in removed {
            self.ensure_root().await?;
            cancel.check()?;
            if let Err(e) = self.trash_one(journal, uid).await {
                if e.is_phase_fatal() {
                    return Err(e);
                }
                warn!(uid = %uid, error = %e, "failed to trash file, skipping");
            }
        }
        Ok(())
    }

    async fn trash_one(&self, journal: &Journal, uid: &str) -> Result<(), ExportError> {
        let record = journal.snapshot().await?;
        let Some(name) = record.file_export_names.get(uid).cloned() else {
            return Ok(());
        };
        let Some(collection_id) = collection_id_from_uid(uid) else {
            warn!(uid = %uid, "malformed journal UID, skipping");
            return Ok(());
        };
        let Some(dir_name) = record.collection_export_names.get(&collection_id).cloned() else {
            warn!(uid = %uid, collection = collection_id, "no directory recorded for collection, skipping");
            return Ok(());
        };

        journal.remove_file_name(uid).await?;
        if let Err(e) = self.move_entry_to_trash(&dir_name, &name).await {
            journal.set_file_name(uid, name).await?;
            return Err(e);
        }
        debug!(uid = %uid, "trashed");
        Ok(())
    }

    /// Move every leg of `name` and its sidecar into the trash tree.
    /// Each `exists` probe precedes each move so partial prior state is
    /// tolerated.
    async fn move_entry_to_trash(
        &self,
        dir_name: &str,
        name: &ExportName,
    ) -> Result<(), ExportError> {
        for basename in name.basenames() {
            let src = self.paths.file_path(dir_name, basename);
            if self.fs.exists(&src).await {
                let parent = self.paths.trash_collection_dir(dir_name);
                let trashed = names::allocate(self.fs.as_ref(), &parent, basename).await?;
                self.fs.move_file(&src, &parent.join(trashed)).await?;
            }

            let sidecar_src = self.paths.sidecar_file(dir_name, basename);
            if self.fs.exists(&sidecar_src).await {
                let parent = self.paths.trash_metadata_dir(dir_name);
                let trashed =
                    names::allocate(self.fs.as_ref(), &parent, &format!("{basename}.json")).await?;
                self.fs.move_file(&sidecar_src, &parent.join(trashed)).await?;
            }
        }
        Ok(())
    }

    // === Phase 3: export files ===

    async fn export_files(
        &self,
        journal: &Journal,
        files: &[RemoteFile],
        collections: &BTreeMap<CollectionId, Collection>,
        cancel: &CancelFlag,
        progress: &mut ExportProgress,
    ) -> Result<(), ExportError> {
        for file in files {
            self.ensure_root().await?;
            cancel.check()?;
            match self.export_one(journal, file, collections).await {
                Ok(()) => progress.success += 1,
                Err(e) if e.is_phase_fatal() => return Err(e),
                Err(e) => {
                    progress.failed += 1;
                    warn!(file = file.id, error = %e, "file export failed, skipping");
                }
            }
            self.observer.on_progress(*progress);
        }
        Ok(())
    }

    /// Directory name for a collection, allocating and recording one on
    /// first use (record-then-create).
    async fn ensure_collection_dir(
        &self,
        journal: &Journal,
        collection_id: CollectionId,
        collections: &BTreeMap<CollectionId, Collection>,
    ) -> Result<String, ExportError> {
        let record = journal.snapshot().await?;
        let dir_name = match record.collection_export_names.get(&collection_id) {
            Some(name) => name.clone(),
            None => {
                let desired = collections
                    .get(&collection_id)
                    .map_or("Untitled", |c| c.name.as_str());
                let name =
                    names::allocate(self.fs.as_ref(), &self.paths.export_dir(), desired).await?;
                journal.set_collection_name(collection_id, &name).await?;
                name
            }
        };

        self.fs
            .check_exists_and_create_dir(&self.paths.collection_dir(&dir_name))
            .await?;
        self.fs
            .check_exists_and_create_dir(&self.paths.metadata_dir(&dir_name))
            .await?;
        Ok(dir_name)
    }

    async fn export_one(
        &self,
        journal: &Journal,
        file: &RemoteFile,
        collections: &BTreeMap<CollectionId, Collection>,
    ) -> Result<(), ExportError> {
        let dir_name = self
            .ensure_collection_dir(journal, file.collection_id, collections)
            .await?;

        let stream = self.downloader.get_file(file).await?;
        let stream = match file.kind {
            FileKind::Image => self.exif.rewrite(file, stream).await?,
            FileKind::Video | FileKind::LivePhoto => stream,
        };

        match file.kind {
            FileKind::LivePhoto => self.export_live_photo(journal, file, &dir_name, stream).await,
            FileKind::Image | FileKind::Video => {
                self.export_single(journal, file, &dir_name, stream).await
            }
        }
    }

    async fn export_single(
        &self,
        journal: &Journal,
        file: &RemoteFile,
        dir_name: &str,
        stream: ByteStream,
    ) -> Result<(), ExportError> {
        let uid = file.export_uid();
        let dir = self.paths.collection_dir(dir_name);
        let basename = names::allocate(self.fs.as_ref(), &dir, &file.metadata.title).await?;

        journal
            .set_file_name(&uid, ExportName::Single(basename.clone()))
            .await?;

        let written = async {
            let sidecar = Sidecar::for_file(file, &basename);
            self.fs
                .save_file_to_disk(&self.paths.sidecar_file(dir_name, &basename), &sidecar.to_json())
                .await?;
            self.fs
                .save_stream_to_disk(&self.paths.file_path(dir_name, &basename), stream)
                .await
        }
        .await;

        if let Err(e) = written {
            journal.remove_file_name(&uid).await?;
            return Err(e);
        }
        debug!(file = file.id, name = %basename, "exported");
        Ok(())
    }

    async fn export_live_photo(
        &self,
        journal: &Journal,
        file: &RemoteFile,
        dir_name: &str,
        stream: ByteStream,
    ) -> Result<(), ExportError> {
        let uid = file.export_uid();
        let blob = collect_stream(stream).await?;
        let parts = self.live.decode(file, blob).await?;

        let dir = self.paths.collection_dir(dir_name);
        let image_name = names::allocate(self.fs.as_ref(), &dir, &parts.image_title).await?;
        let video_name = names::allocate_excluding(
            self.fs.as_ref(),
            &dir,
            &parts.video_title,
            &[image_name.as_str()],
        )
        .await?;

        journal
            .set_file_name(
                &uid,
                ExportName::LivePhoto {
                    image: image_name.clone(),
                    video: video_name.clone(),
                },
            )
            .await?;

        if let Err(e) = self
            .write_live_photo(file, dir_name, &image_name, &video_name, &parts)
            .await
        {
            // The image leg may already be on disk; both legs go or neither.
            let _ = self
                .fs
                .delete_file(&self.paths.file_path(dir_name, &image_name))
                .await;
            let _ = self
                .fs
                .delete_file(&self.paths.sidecar_file(dir_name, &image_name))
                .await;
            journal.remove_file_name(&uid).await?;
            return Err(e);
        }
        debug!(file = file.id, image = %image_name, video = %video_name, "exported live photo");
        Ok(())
    }

    /// Write order: image sidecar, image bytes, video sidecar, video bytes.
    async fn write_live_photo(
        &self,
        file: &RemoteFile,
        dir_name: &str,
        image_name: &str,
        video_name: &str,
        parts: &LivePhotoParts,
    ) -> Result<(), ExportError> {
        let image_sidecar = Sidecar::for_file(file, image_name);
        self.fs
            .save_file_to_disk(
                &self.paths.sidecar_file(dir_name, image_name),
                &image_sidecar.to_json(),
            )
            .await?;
        self.fs
            .save_stream_to_disk(
                &self.paths.file_path(dir_name, image_name),
                stream_from_bytes(parts.image.clone()),
            )
            .await?;

        let video_sidecar = Sidecar::for_file(file, video_name);
        self.fs
            .save_file_to_disk(
                &self.paths.sidecar_file(dir_name, video_name),
                &video_sidecar.to_json(),
            )
            .await?;
        self.fs
            .save_stream_to_disk(
                &self.paths.file_path(dir_name, video_name),
                stream_from_bytes(parts.video.clone()),
            )
            .await
    }

    // === Phase 4: remove emptied collection directories ===

    async fn remove_deleted_collections(
        &self,
        journal: &Journal,
        deleted: &[CollectionId],
        cancel: &CancelFlag,
    ) -> Result<(), ExportError> {
        for id in deleted {
            self.ensure_root().await?;
            cancel.check()?;
            match self.remove_collection(journal, *id).await {
                Ok(()) => {}
                Err(e) if e.is_phase_fatal() || matches!(e, ExportError::CollectionNotEmpty(_)) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(collection = id, error = %e, "failed to remove collection directory, skipping");
                }
            }
        }
        Ok(())
    }

    async fn remove_collection(
        &self,
        journal: &Journal,
        id: CollectionId,
    ) -> Result<(), ExportError> {
        let record = journal.snapshot().await?;
        let Some(dir_name) = record.collection_export_names.get(&id).cloned() else {
            return Ok(());
        };
        if record.files_in_collection(id) > 0 {
            return Err(ExportError::CollectionNotEmpty(id));
        }

        journal.remove_collection_name(id).await?;
        let deleted = async {
            self.fs
                .delete_folder(&self.paths.metadata_dir(&dir_name))
                .await?;
            self.fs
                .delete_folder(&self.paths.collection_dir(&dir_name))
                .await
        }
        .await;

        if let Err(e) = deleted {
            journal.set_collection_name(id, &dir_name).await?;
            return Err(e);
        }
        info!(collection = id, dir = %dir_name, "removed emptied collection directory");
        Ok(())
    }
}
