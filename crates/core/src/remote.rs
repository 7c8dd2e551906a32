//! Ports onto the remote photo service.
//!
//! The real API client, decryption, and EXIF rewriting live outside this
//! crate; the engine only sees these contracts.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ExportError;
use crate::gateway::ByteStream;
use crate::model::{Collection, RemoteFile, UserId};

/// Produces decrypted byte streams for remote files
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch the decrypted content of `file` as a lazy byte stream.
    ///
    /// The returned stream is single-owner: the caller must fully consume it
    /// or drop it.
    async fn get_file(&self, file: &RemoteFile) -> Result<ByteStream, ExportError>;
}

/// Authoritative snapshots of the remote library
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// The active user identity, used for ownership filtering.
    async fn current_user(&self) -> Result<UserId, ExportError>;

    async fn all_files(&self) -> Result<Vec<RemoteFile>, ExportError>;

    async fn all_collections(&self) -> Result<Vec<Collection>, ExportError>;
}

/// Rewrites capture metadata into the image stream before it hits disk.
///
/// Non-image kinds bypass this port.
#[async_trait]
pub trait ExifRewriter: Send + Sync {
    async fn rewrite(
        &self,
        file: &RemoteFile,
        stream: ByteStream,
    ) -> Result<ByteStream, ExportError>;
}

/// The two halves of a decoded live photo
#[derive(Debug, Clone)]
pub struct LivePhotoParts {
    pub image: Bytes,
    pub image_title: String,
    pub video: Bytes,
    pub video_title: String,
}

/// Splits a fully-materialized live-photo blob into its image and video
/// halves
#[async_trait]
pub trait LivePhotoDecoder: Send + Sync {
    async fn decode(&self, file: &RemoteFile, blob: Bytes)
        -> Result<LivePhotoParts, ExportError>;
}
