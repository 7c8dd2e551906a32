//! Filesystem port used by the engine.
//!
//! This trait allows swapping the real filesystem for an in-memory
//! implementation in tests. No ordering or concurrency guarantees are
//! assumed across calls; callers serialize where required.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::ExportError;

/// Lazy byte sequence produced by the downloader and consumed by
/// [`FsGateway::save_stream_to_disk`]
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Narrow abstraction over the platform filesystem and user prompts
#[async_trait]
pub trait FsGateway: Send + Sync {
    /// Ask the user for an export directory.
    ///
    /// # Errors
    /// Returns [`ExportError::SelectFolderAborted`] if the user dismisses
    /// the picker.
    async fn select_directory(&self) -> Result<PathBuf, ExportError>;

    async fn exists(&self, path: &Path) -> bool;

    /// Idempotent mkdir-p of the final component.
    async fn check_exists_and_create_dir(&self, path: &Path) -> Result<(), ExportError>;

    /// Atomic directory rename on the same volume.
    async fn rename(&self, old: &Path, new: &Path) -> Result<(), ExportError>;

    /// Move a file, creating destination parents as needed.
    async fn move_file(&self, src: &Path, dst: &Path) -> Result<(), ExportError>;

    async fn delete_file(&self, path: &Path) -> Result<(), ExportError>;

    async fn delete_folder(&self, path: &Path) -> Result<(), ExportError>;

    /// Atomically replace `path` with `text`.
    async fn save_file_to_disk(&self, path: &Path, text: &str) -> Result<(), ExportError>;

    /// Write a byte stream to a fresh file. Must not leave a partial file
    /// behind on failure.
    async fn save_stream_to_disk(&self, path: &Path, stream: ByteStream)
        -> Result<(), ExportError>;

    async fn read_text_file(&self, path: &Path) -> Result<String, ExportError>;
}

/// Wrap an in-memory blob as a single-chunk [`ByteStream`].
#[must_use]
pub fn stream_from_bytes(bytes: Bytes) -> ByteStream {
    use futures::StreamExt as _;
    futures::stream::once(async move { Ok(bytes) }).boxed()
}

/// Fully materialize a stream into one blob.
///
/// # Errors
/// Propagates the first chunk error; earlier chunks are discarded.
pub async fn collect_stream(mut stream: ByteStream) -> Result<Bytes, ExportError> {
    use bytes::BytesMut;
    use futures::StreamExt as _;

    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}
