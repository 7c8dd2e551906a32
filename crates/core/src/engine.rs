//! Export scheduler: single-flight runs, cancellation, coalesced re-runs,
//! and continuous export.
//!
//! Only one run executes at a time. A `schedule()` call during a run marks
//! a re-run as pending instead of starting a second one; on completion the
//! pending run is kicked off through a freshly spawned task, which breaks
//! the call stack and bounds recursion.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cancel::CancelFlag;
use crate::error::ExportError;
use crate::gateway::FsGateway;
use crate::journal::{ExportStage, Journal};
use crate::materialize::Materializer;
use crate::migrate;
use crate::model::{Collection, CollectionId};
use crate::observe::{ExportObserver, ExportProgress};
use crate::paths::ExportPaths;
use crate::plan::plan_export;
use crate::remote::{Downloader, ExifRewriter, InventoryProvider, LivePhotoDecoder};

/// Library-change notifications that retrigger reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryEvent {
    FilesUpdated,
}

/// Typed broadcast bus for [`LibraryEvent`]s.
///
/// Emitters and the engine each hold a clone; subscriptions are released by
/// dropping the receiver.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LibraryEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn emit(&self, event: LibraryEvent) {
        // No receivers is fine; continuous export is simply disabled.
        let _ = self.tx.send(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// External collaborators the engine drives
pub struct EnginePorts {
    pub fs: Arc<dyn FsGateway>,
    pub downloader: Arc<dyn Downloader>,
    pub exif: Arc<dyn ExifRewriter>,
    pub live: Arc<dyn LivePhotoDecoder>,
    pub inventory: Arc<dyn InventoryProvider>,
}

enum RunState {
    Idle,
    Running {
        cancel: CancelFlag,
        rerun_pending: bool,
    },
}

struct EngineInner {
    ports: EnginePorts,
    paths: ExportPaths,
    observer: Arc<dyn ExportObserver>,
    state: Mutex<RunState>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
    idle_notify: Notify,
}

/// The export engine, owned by the application shell
#[derive(Clone)]
pub struct ExportEngine {
    inner: Arc<EngineInner>,
}

impl ExportEngine {
    #[must_use]
    pub fn new(ports: EnginePorts, paths: ExportPaths, observer: Arc<dyn ExportObserver>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                ports,
                paths,
                observer,
                state: Mutex::new(RunState::Idle),
                watch_task: Mutex::new(None),
                idle_notify: Notify::new(),
            }),
        }
    }

    /// Start an export run, or mark a re-run as pending if one is active.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if let RunState::Running { rerun_pending, .. } = &mut *state {
            debug!("export already running, coalescing into pending re-run");
            *rerun_pending = true;
            return;
        }

        let cancel = CancelFlag::new();
        *state = RunState::Running {
            cancel: cancel.clone(),
            rerun_pending: false,
        };
        drop(state);
        tokio::spawn(EngineInner::run_task(self.inner.clone(), cancel));
    }

    /// Request cooperative cancellation of the active run, if any.
    pub fn stop(&self) {
        if let RunState::Running { cancel, .. } = &*self.inner.state.lock().unwrap() {
            info!("stopping export run");
            cancel.cancel();
        }
    }

    /// Whether a run is currently executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(&*self.inner.state.lock().unwrap(), RunState::Running { .. })
    }

    /// Wait until the engine returns to idle.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle_notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a completion between
            // the check and the await is not missed.
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    /// Subscribe to `bus` and reschedule on every library change. Also
    /// schedules one run immediately. Idempotent while enabled.
    pub fn enable_continuous(&self, bus: &EventBus) {
        let mut watch = self.inner.watch_task.lock().unwrap();
        if watch.is_some() {
            return;
        }
        let mut rx = bus.subscribe();
        let engine = self.clone();
        *watch = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(LibraryEvent::FilesUpdated) => engine.schedule(),
                    // Missed events still mean the library changed.
                    Err(broadcast::error::RecvError::Lagged(_)) => engine.schedule(),
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        drop(watch);
        self.schedule();
    }

    /// Release the continuous-export subscription. Idempotent.
    pub fn disable_continuous(&self) {
        if let Some(handle) = self.inner.watch_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn is_continuous_enabled(&self) -> bool {
        self.inner.watch_task.lock().unwrap().is_some()
    }

    /// Schedule a catch-up run if the journal says a previous run was
    /// interrupted. Returns whether one was scheduled.
    pub async fn resume_if_interrupted(&self) -> Result<bool, ExportError> {
        let inner = &self.inner;
        if !inner.ports.fs.exists(&inner.paths.journal_file()).await {
            return Ok(false);
        }
        let journal = Journal::open(inner.ports.fs.clone(), inner.paths.clone()).await?;
        let stage = journal.snapshot().await?.stage;
        if stage.is_in_progress() {
            info!(?stage, "previous export was interrupted, resuming");
            self.schedule();
            return Ok(true);
        }
        Ok(false)
    }
}

impl EngineInner {
    async fn run_task(inner: Arc<Self>, cancel: CancelFlag) {
        match inner.run_once(&cancel).await {
            Ok(progress) => {
                info!(
                    success = progress.success,
                    failed = progress.failed,
                    "export run finished"
                );
            }
            Err(ExportError::Stopped) => info!("export run stopped"),
            Err(ExportError::FolderDoesNotExist) => {
                warn!("export folder does not exist, run aborted");
            }
            Err(e) => error!(error = %e, "export run failed"),
        }

        let rerun_pending = {
            let mut state = inner.state.lock().unwrap();
            let pending = matches!(
                &*state,
                RunState::Running {
                    rerun_pending: true,
                    ..
                }
            );
            *state = RunState::Idle;
            pending
        };
        inner.idle_notify.notify_waiters();

        if rerun_pending {
            debug!("running coalesced re-run");
            let engine = ExportEngine { inner };
            tokio::spawn(async move { engine.schedule() });
        }
    }

    async fn run_once(&self, cancel: &CancelFlag) -> Result<ExportProgress, ExportError> {
        let journal = self.pre_export().await?;

        let user = self.ports.inventory.current_user().await?;
        let files = self.ports.inventory.all_files().await?;
        let collections = self.ports.inventory.all_collections().await?;

        let record = journal.snapshot().await?;
        let plan = plan_export(user, &files, &collections, &record);
        self.observer.on_pending_exports(&plan.files_to_export);

        let by_id: BTreeMap<CollectionId, Collection> =
            collections.iter().map(|c| (c.id, c.clone())).collect();
        let materializer = Materializer::new(
            self.ports.fs.clone(),
            self.ports.downloader.clone(),
            self.ports.exif.clone(),
            self.ports.live.clone(),
            self.paths.clone(),
            self.observer.clone(),
        );
        let result = materializer.run(&journal, &plan, &by_id, cancel).await;

        // postExport runs whether the phases completed or not.
        let post = self
            .post_export(&journal, user, &files, &collections)
            .await;
        let progress = result?;
        post?;
        Ok(progress)
    }

    async fn pre_export(&self) -> Result<Journal, ExportError> {
        if !self.ports.fs.exists(self.paths.base()).await {
            return Err(ExportError::FolderDoesNotExist);
        }
        self.ports
            .fs
            .check_exists_and_create_dir(&self.paths.export_dir())
            .await?;

        let journal = Journal::open(self.ports.fs.clone(), self.paths.clone()).await?;
        journal.set_stage(ExportStage::Migration).await?;
        self.observer.on_stage(ExportStage::Migration);
        migrate::run(&self.ports.fs, &self.paths, &journal).await?;

        journal.set_stage(ExportStage::Starting).await?;
        self.observer.on_stage(ExportStage::Starting);
        Ok(journal)
    }

    async fn post_export(
        &self,
        journal: &Journal,
        user: crate::model::UserId,
        files: &[crate::model::RemoteFile],
        collections: &[Collection],
    ) -> Result<(), ExportError> {
        if !self.ports.fs.exists(self.paths.base()).await {
            // Nothing left to persist to; the next run starts over.
            journal.reset_stage_local().await;
            self.observer.on_stage(ExportStage::Init);
            return Ok(());
        }

        journal.set_stage(ExportStage::Finished).await?;
        self.observer.on_stage(ExportStage::Finished);

        let now = Utc::now().timestamp_millis();
        journal.set_last_attempt(now).await?;
        self.observer.on_last_export(now);

        let record = journal.snapshot().await?;
        let pending = plan_export(user, files, collections, &record).files_to_export;
        self.observer.on_pending_exports(&pending);
        Ok(())
    }
}
