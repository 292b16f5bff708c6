use super::FileSystemBackend;
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// [`FileSystemBackend`] over the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystemBackend for LocalFileSystem {
    async fn exists(&self, path: &Path) -> BackendResult<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn is_dir(&self, path: &Path) -> BackendResult<bool> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_dir(&self, dir: &Path) -> BackendResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| BackendError::Io(format!("{}: {e}", dir.display())))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    async fn create_dir_all(&self, dir: &Path) -> BackendResult<()> {
        Ok(fs::create_dir_all(dir).await?)
    }

    async fn copy(&self, from: &Path, to: &Path) -> BackendResult<u64> {
        debug!(from = %from.display(), to = %to.display(), "copy file");
        fs::copy(from, to)
            .await
            .map_err(|e| BackendError::operation_failed("copy", format!("{}: {e}", from.display())))
    }

    async fn rename(&self, from: &Path, to: &Path) -> BackendResult<()> {
        debug!(from = %from.display(), to = %to.display(), "rename file");
        fs::rename(from, to)
            .await
            .map_err(|e| BackendError::operation_failed("rename", format!("{}: {e}", from.display())))
    }

    async fn remove_file(&self, path: &Path) -> BackendResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_and_rename_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fs_backend = LocalFileSystem::new();
        let source = dir.path().join("a.jpg");
        std::fs::write(&source, b"jpeg").unwrap();

        let renamed = dir.path().join("2015-03-02_a.jpg");
        fs_backend.rename(&source, &renamed).await.unwrap();
        assert!(!fs_backend.exists(&source).await.unwrap());

        let copy_dir = dir.path().join("master");
        fs_backend.create_dir_all(&copy_dir).await.unwrap();
        let copied = copy_dir.join("2015-03-02_a.jpg");
        assert_eq!(fs_backend.copy(&renamed, &copied).await.unwrap(), 4);

        assert!(fs_backend.is_dir(&copy_dir).await.unwrap());
        assert_eq!(fs_backend.list_dir(&copy_dir).await.unwrap(), vec![copied]);
    }

    #[tokio::test]
    async fn removing_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFileSystem::new()
            .remove_file(&dir.path().join("missing.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }
}
