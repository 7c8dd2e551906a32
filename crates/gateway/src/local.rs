//! Real-filesystem implementation of the engine's [`FsGateway`] port

use std::io::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;

use pixport_core::gateway::{ByteStream, FsGateway};
use pixport_core::ExportError;

/// [`FsGateway`] over `std::fs`.
///
/// Replacing writes go through a sibling temp file followed by a rename, so
/// readers never observe a half-written journal or sidecar, and stream
/// writes never leave a partial file behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn temp_sibling(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{name}.pixport-tmp"))
    }
}

#[async_trait]
impl FsGateway for LocalFs {
    async fn select_directory(&self) -> Result<PathBuf, ExportError> {
        print!("Export folder: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ExportError::SelectFolderAborted);
        }
        Ok(PathBuf::from(trimmed))
    }

    async fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    async fn check_exists_and_create_dir(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    async fn rename(&self, old: &Path, new: &Path) -> Result<(), ExportError> {
        std::fs::rename(old, new)?;
        Ok(())
    }

    async fn move_file(&self, src: &Path, dst: &Path) -> Result<(), ExportError> {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Cross-volume move: copy then unlink.
                std::fs::copy(src, dst)?;
                std::fs::remove_file(src)?;
                Ok(())
            }
        }
    }

    async fn delete_file(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    async fn delete_folder(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    async fn save_file_to_disk(&self, path: &Path, text: &str) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = Self::temp_sibling(path);
        std::fs::write(&temp, text)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    async fn save_stream_to_disk(
        &self,
        path: &Path,
        mut stream: ByteStream,
    ) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = Self::temp_sibling(path);
        let mut file = std::fs::File::create(&temp)?;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = std::fs::remove_file(&temp);
                    return Err(e.into());
                }
            };
            if let Err(e) = file.write_all(&chunk) {
                drop(file);
                let _ = std::fs::remove_file(&temp);
                return Err(e.into());
            }
        }
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    async fn read_text_file(&self, path: &Path) -> Result<String, ExportError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
