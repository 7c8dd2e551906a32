//! In-memory [`FsGateway`] used by unit tests across this crate.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::ExportError;
use crate::gateway::{ByteStream, FsGateway};

#[derive(Default)]
struct State {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

/// In-memory filesystem. Directories are implicit where convenient; writes
/// to paths registered via [`MemFs::fail_writes_to`] fail with an I/O error.
#[derive(Clone, Default)]
pub(crate) struct MemFs {
    state: Arc<Mutex<State>>,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_file(&self, path: impl Into<PathBuf>, contents: impl AsRef<[u8]>) {
        let path = path.into();
        let mut state = self.state.lock().unwrap();
        add_ancestors(&mut state.dirs, &path);
        state.files.insert(path, contents.as_ref().to_vec());
    }

    pub fn put_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.state.lock().unwrap();
        add_ancestors(&mut state.dirs, &path.join("x"));
    }

    /// Make every subsequent write to `path` fail.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing.lock().unwrap().insert(path.into());
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    fn check_injected(&self, path: &Path) -> Result<(), ExportError> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(ExportError::Io(std::io::Error::other("injected failure")));
        }
        Ok(())
    }
}

fn add_ancestors(dirs: &mut BTreeSet<PathBuf>, path: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() {
            break;
        }
        dirs.insert(dir.to_path_buf());
        current = dir.parent();
    }
}

#[async_trait]
impl FsGateway for MemFs {
    async fn select_directory(&self) -> Result<PathBuf, ExportError> {
        Err(ExportError::SelectFolderAborted)
    }

    async fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    async fn check_exists_and_create_dir(&self, path: &Path) -> Result<(), ExportError> {
        let mut state = self.state.lock().unwrap();
        add_ancestors(&mut state.dirs, &path.join("x"));
        Ok(())
    }

    async fn rename(&self, old: &Path, new: &Path) -> Result<(), ExportError> {
        let mut state = self.state.lock().unwrap();
        if !state.dirs.contains(old) && !state.files.contains_key(old) {
            return Err(ExportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("rename source missing: {}", old.display()),
            )));
        }

        let moved_files: Vec<(PathBuf, Vec<u8>)> = state
            .files
            .iter()
            .filter(|(p, _)| *p == old || p.starts_with(old))
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        for (p, contents) in moved_files {
            state.files.remove(&p);
            let tail = p.strip_prefix(old).unwrap().to_path_buf();
            state.files.insert(new.join(tail), contents);
        }

        let moved_dirs: Vec<PathBuf> = state
            .dirs
            .iter()
            .filter(|p| *p == old || p.starts_with(old))
            .cloned()
            .collect();
        for p in moved_dirs {
            state.dirs.remove(&p);
            let tail = p.strip_prefix(old).unwrap().to_path_buf();
            state.dirs.insert(new.join(tail));
        }
        add_ancestors(&mut state.dirs, &new.join("x"));
        Ok(())
    }

    async fn move_file(&self, src: &Path, dst: &Path) -> Result<(), ExportError> {
        self.check_injected(dst)?;
        let mut state = self.state.lock().unwrap();
        let Some(contents) = state.files.remove(src) else {
            return Err(ExportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("move source missing: {}", src.display()),
            )));
        };
        add_ancestors(&mut state.dirs, dst);
        state.files.insert(dst.to_path_buf(), contents);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<(), ExportError> {
        self.state.lock().unwrap().files.remove(path);
        Ok(())
    }

    async fn delete_folder(&self, path: &Path) -> Result<(), ExportError> {
        let mut state = self.state.lock().unwrap();
        state.files.retain(|p, _| !p.starts_with(path));
        state.dirs.retain(|p| !(p == path || p.starts_with(path)));
        Ok(())
    }

    async fn save_file_to_disk(&self, path: &Path, text: &str) -> Result<(), ExportError> {
        self.check_injected(path)?;
        self.put_file(path, text);
        Ok(())
    }

    async fn save_stream_to_disk(
        &self,
        path: &Path,
        mut stream: ByteStream,
    ) -> Result<(), ExportError> {
        self.check_injected(path)?;
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);
        }
        self.put_file(path, buffer);
        Ok(())
    }

    async fn read_text_file(&self, path: &Path) -> Result<String, ExportError> {
        let state = self.state.lock().unwrap();
        let Some(contents) = state.files.get(path) else {
            return Err(ExportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )));
        };
        String::from_utf8(contents.clone())
            .map_err(|e| ExportError::Io(std::io::Error::other(e)))
    }
}

/// Wrap static bytes as a [`ByteStream`] of small chunks.
pub(crate) fn byte_stream(data: &[u8]) -> ByteStream {
    let chunks: Vec<std::io::Result<bytes::Bytes>> = data
        .chunks(8)
        .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
        .collect();
    futures::stream::iter(chunks).boxed()
}

/// A [`ByteStream`] that yields one good chunk and then an error.
pub(crate) fn failing_stream() -> ByteStream {
    futures::stream::iter(vec![
        Ok(bytes::Bytes::from_static(b"partial")),
        Err(std::io::Error::other("stream broke")),
    ])
    .boxed()
}

use std::collections::HashMap;

use bytes::Bytes;

use crate::cancel::CancelFlag;
use crate::model::{Collection, FileId, RemoteFile, UserId};
use crate::remote::{Downloader, ExifRewriter, InventoryProvider, LivePhotoDecoder, LivePhotoParts};

/// Scripted remote service implementing all four remote ports.
#[derive(Default)]
pub(crate) struct FakeRemote {
    pub user: UserId,
    pub files: Mutex<Vec<RemoteFile>>,
    pub collections: Mutex<Vec<Collection>>,
    blobs: Mutex<HashMap<FileId, Vec<u8>>>,
    live_parts: Mutex<HashMap<FileId, LivePhotoParts>>,
    fail_downloads: Mutex<HashSet<FileId>>,
    fail_streams: Mutex<HashSet<FileId>>,
    cancel_on_download: Mutex<Option<(FileId, CancelFlag)>>,
    download_delay: Mutex<Option<std::time::Duration>>,
}

impl FakeRemote {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }

    pub fn put_blob(&self, id: FileId, data: &[u8]) {
        self.blobs.lock().unwrap().insert(id, data.to_vec());
    }

    pub fn put_live(&self, id: FileId, image_title: &str, image: &[u8], video_title: &str, video: &[u8]) {
        self.live_parts.lock().unwrap().insert(
            id,
            LivePhotoParts {
                image: Bytes::copy_from_slice(image),
                image_title: image_title.to_string(),
                video: Bytes::copy_from_slice(video),
                video_title: video_title.to_string(),
            },
        );
    }

    pub fn fail_download(&self, id: FileId) {
        self.fail_downloads.lock().unwrap().insert(id);
    }

    /// Serve a stream for `id` that errors after its first chunk.
    pub fn fail_stream_for(&self, id: FileId) {
        self.fail_streams.lock().unwrap().insert(id);
    }

    /// Flip `flag` when `id` is downloaded, simulating `stop()` arriving
    /// while an item is in flight.
    pub fn cancel_on_download(&self, id: FileId, flag: CancelFlag) {
        *self.cancel_on_download.lock().unwrap() = Some((id, flag));
    }

    /// Make every download take at least `delay`.
    pub fn delay_downloads(&self, delay: std::time::Duration) {
        *self.download_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl Downloader for FakeRemote {
    async fn get_file(&self, file: &RemoteFile) -> Result<ByteStream, ExportError> {
        let delay = *self.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((id, flag)) = self.cancel_on_download.lock().unwrap().as_ref() {
            if *id == file.id {
                flag.cancel();
            }
        }
        if self.fail_downloads.lock().unwrap().contains(&file.id) {
            return Err(ExportError::Download(format!("no stream for file {}", file.id)));
        }
        if self.fail_streams.lock().unwrap().contains(&file.id) {
            return Ok(failing_stream());
        }
        let blob = self
            .blobs
            .lock()
            .unwrap()
            .get(&file.id)
            .cloned()
            .unwrap_or_default();
        Ok(byte_stream(&blob))
    }
}

#[async_trait]
impl InventoryProvider for FakeRemote {
    async fn current_user(&self) -> Result<UserId, ExportError> {
        Ok(self.user)
    }

    async fn all_files(&self) -> Result<Vec<RemoteFile>, ExportError> {
        Ok(self.files.lock().unwrap().clone())
    }

    async fn all_collections(&self) -> Result<Vec<Collection>, ExportError> {
        Ok(self.collections.lock().unwrap().clone())
    }
}

#[async_trait]
impl ExifRewriter for FakeRemote {
    async fn rewrite(
        &self,
        _file: &RemoteFile,
        stream: ByteStream,
    ) -> Result<ByteStream, ExportError> {
        Ok(stream)
    }
}

#[async_trait]
impl LivePhotoDecoder for FakeRemote {
    async fn decode(
        &self,
        file: &RemoteFile,
        _blob: Bytes,
    ) -> Result<LivePhotoParts, ExportError> {
        self.live_parts
            .lock()
            .unwrap()
            .get(&file.id)
            .cloned()
            .ok_or_else(|| ExportError::Decode(format!("no live parts for file {}", file.id)))
    }
}
