//! pixport-core: photo library export engine
//!
//! Incrementally mirrors a remote photo library into a local directory.
//! Provides the reconciliation planner, the on-disk journal, safe name
//! allocation, the filesystem materializer, and the single-flight export
//! scheduler.

pub mod cancel;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod journal;
pub mod materialize;
pub mod migrate;
pub mod model;
pub mod names;
pub mod observe;
pub mod paths;
pub mod plan;
pub mod remote;
pub mod sidecar;

#[cfg(test)]
pub(crate) mod testutil;

pub use cancel::CancelFlag;
pub use engine::{EnginePorts, EventBus, ExportEngine, LibraryEvent};
pub use error::ExportError;
pub use gateway::{ByteStream, FsGateway};
pub use journal::{ExportName, ExportRecord, ExportStage, Journal, JOURNAL_VERSION};
pub use materialize::Materializer;
pub use model::{Collection, CollectionId, FileId, FileKind, FileMetadata, RemoteFile, UserId};
pub use observe::{ExportObserver, ExportProgress, NoopObserver};
pub use paths::ExportPaths;
pub use plan::{plan_export, ExportPlan};
pub use remote::{Downloader, ExifRewriter, InventoryProvider, LivePhotoDecoder, LivePhotoParts};
pub use sidecar::Sidecar;
