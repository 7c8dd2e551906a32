//! Manifest-driven local photo library.
//!
//! Serves a directory holding a `library.json` manifest plus blob files as
//! the remote side of the engine: inventory provider, downloader, and
//! live-photo decoder. The manifest is re-read on every snapshot so watch
//! mode sees edits immediately.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pixport_core::gateway::ByteStream;
use pixport_core::remote::{
    Downloader, ExifRewriter, InventoryProvider, LivePhotoDecoder, LivePhotoParts,
};
use pixport_core::{Collection, ExportError, FileId, RemoteFile, UserId};

/// Manifest file name inside the library directory
pub const MANIFEST_FILE: &str = "library.json";

const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// One file in the library: remote attributes plus where its bytes live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub file: RemoteFile,
    /// Blob path relative to the library directory
    pub blob: PathBuf,
}

/// The `library.json` document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryManifest {
    pub user_id: UserId,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
}

/// A read-only library rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalLibrary {
    dir: PathBuf,
}

impl LocalLibrary {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest(&self) -> Result<LibraryManifest, ExportError> {
        let path = self.dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ExportError::Download(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ExportError::Download(format!("invalid manifest: {e}")))
    }

    fn blob_path(&self, id: FileId) -> Result<PathBuf, ExportError> {
        let manifest = self.manifest()?;
        let entry = manifest
            .files
            .iter()
            .find(|e| e.file.id == id)
            .ok_or_else(|| ExportError::Download(format!("file {id} not in library")))?;
        Ok(self.dir.join(&entry.blob))
    }
}

#[async_trait]
impl InventoryProvider for LocalLibrary {
    async fn current_user(&self) -> Result<UserId, ExportError> {
        Ok(self.manifest()?.user_id)
    }

    async fn all_files(&self) -> Result<Vec<RemoteFile>, ExportError> {
        Ok(self.manifest()?.files.into_iter().map(|e| e.file).collect())
    }

    async fn all_collections(&self) -> Result<Vec<Collection>, ExportError> {
        Ok(self.manifest()?.collections)
    }
}

#[async_trait]
impl Downloader for LocalLibrary {
    async fn get_file(&self, file: &RemoteFile) -> Result<ByteStream, ExportError> {
        let path = self.blob_path(file.id)?;
        let data = std::fs::read(&path)
            .map_err(|e| ExportError::Download(format!("{}: {e}", path.display())))?;
        debug!(file = file.id, bytes = data.len(), "serving blob");

        let chunks: Vec<std::io::Result<Bytes>> = data
            .chunks(DOWNLOAD_CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Identity EXIF adapter: hands the stream back untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExif;

#[async_trait]
impl ExifRewriter for PassthroughExif {
    async fn rewrite(
        &self,
        _file: &RemoteFile,
        stream: ByteStream,
    ) -> Result<ByteStream, ExportError> {
        Ok(stream)
    }
}

// === Live-photo container ===
//
// A live-photo blob is a self-describing container: a 4-byte big-endian
// header length, a JSON header naming both titles and the image length,
// then the image bytes followed by the video bytes.

#[derive(Debug, Serialize, Deserialize)]
struct LiveHeader {
    image_title: String,
    video_title: String,
    image_len: u64,
}

/// Pack live-photo parts into the container format served by the library.
#[must_use]
pub fn encode_live_photo(parts: &LivePhotoParts) -> Vec<u8> {
    let header = serde_json::to_vec(&LiveHeader {
        image_title: parts.image_title.clone(),
        video_title: parts.video_title.clone(),
        image_len: parts.image.len() as u64,
    })
    .expect("header serialization is infallible");

    let mut out = Vec::with_capacity(4 + header.len() + parts.image.len() + parts.video.len());
    out.extend_from_slice(&(header.len() as u32).to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&parts.image);
    out.extend_from_slice(&parts.video);
    out
}

fn decode_live_photo(blob: &[u8]) -> Result<LivePhotoParts, ExportError> {
    let too_short = || ExportError::Decode("truncated live photo container".into());

    let header_len =
        u32::from_be_bytes(blob.get(..4).ok_or_else(too_short)?.try_into().unwrap()) as usize;
    let header_end = 4 + header_len;
    let header: LiveHeader =
        serde_json::from_slice(blob.get(4..header_end).ok_or_else(too_short)?)
            .map_err(|e| ExportError::Decode(format!("bad live photo header: {e}")))?;

    let image_end = header_end + header.image_len as usize;
    let image = blob.get(header_end..image_end).ok_or_else(too_short)?;
    let video = blob.get(image_end..).ok_or_else(too_short)?;

    Ok(LivePhotoParts {
        image: Bytes::copy_from_slice(image),
        image_title: header.image_title,
        video: Bytes::copy_from_slice(video),
        video_title: header.video_title,
    })
}

#[async_trait]
impl LivePhotoDecoder for LocalLibrary {
    async fn decode(
        &self,
        _file: &RemoteFile,
        blob: Bytes,
    ) -> Result<LivePhotoParts, ExportError> {
        decode_live_photo(&blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixport_core::{FileKind, FileMetadata};
    use tempfile::TempDir;

    fn entry(id: FileId, collection_id: i64, blob: &str) -> ManifestEntry {
        ManifestEntry {
            file: RemoteFile {
                id,
                collection_id,
                updation_time: 1,
                owner_id: 1,
                kind: FileKind::Image,
                metadata: FileMetadata {
                    title: format!("IMG_{id}.jpg"),
                    creation_time_us: 0,
                    modification_time_us: None,
                    latitude: None,
                    longitude: None,
                },
                public_caption: None,
            },
            blob: PathBuf::from(blob),
        }
    }

    fn write_library(dir: &Path, manifest: &LibraryManifest) {
        std::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(manifest).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_inventory_reflects_manifest_edits() {
        let dir = TempDir::new().unwrap();
        let library = LocalLibrary::new(dir.path());

        let mut manifest = LibraryManifest {
            user_id: 1,
            collections: vec![Collection {
                id: 100,
                owner_id: 1,
                name: "Vacation".into(),
            }],
            files: vec![entry(1, 100, "blobs/1.jpg")],
        };
        write_library(dir.path(), &manifest);

        assert_eq!(library.current_user().await.unwrap(), 1);
        assert_eq!(library.all_files().await.unwrap().len(), 1);

        manifest.files.push(entry(2, 100, "blobs/2.jpg"));
        write_library(dir.path(), &manifest);
        assert_eq!(library.all_files().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_download_streams_blob() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("blobs")).unwrap();
        std::fs::write(dir.path().join("blobs/1.jpg"), b"jpeg bytes").unwrap();

        let manifest = LibraryManifest {
            user_id: 1,
            collections: vec![],
            files: vec![entry(1, 100, "blobs/1.jpg")],
        };
        write_library(dir.path(), &manifest);

        let library = LocalLibrary::new(dir.path());
        let file = library.all_files().await.unwrap().remove(0);
        let stream = library.get_file(&file).await.unwrap();
        let blob = pixport_core::gateway::collect_stream(stream).await.unwrap();
        assert_eq!(&blob[..], b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_download_unknown_file_is_per_item_error() {
        let dir = TempDir::new().unwrap();
        write_library(
            dir.path(),
            &LibraryManifest {
                user_id: 1,
                collections: vec![],
                files: vec![],
            },
        );

        let library = LocalLibrary::new(dir.path());
        let file = entry(9, 100, "nope").file;
        let err = library.get_file(&file).await.err().unwrap();
        assert!(matches!(err, ExportError::Download(_)));
        assert!(!err.is_phase_fatal());
    }

    #[test]
    fn test_live_container_roundtrip() {
        let parts = LivePhotoParts {
            image: Bytes::from_static(b"heic data"),
            image_title: "LP.HEIC".into(),
            video: Bytes::from_static(b"mov data"),
            video_title: "LP.MOV".into(),
        };
        let blob = encode_live_photo(&parts);
        let decoded = decode_live_photo(&blob).unwrap();
        assert_eq!(decoded.image, parts.image);
        assert_eq!(decoded.video, parts.video);
        assert_eq!(decoded.image_title, "LP.HEIC");
        assert_eq!(decoded.video_title, "LP.MOV");
    }

    #[test]
    fn test_truncated_live_container_fails_decode() {
        let parts = LivePhotoParts {
            image: Bytes::from_static(b"heic data"),
            image_title: "LP.HEIC".into(),
            video: Bytes::from_static(b"mov data"),
            video_title: "LP.MOV".into(),
        };
        let blob = encode_live_photo(&parts);
        let err = decode_live_photo(&blob[..10]).unwrap_err();
        assert!(matches!(err, ExportError::Decode(_)));
        assert!(decode_live_photo(&[]).is_err());
    }
}
