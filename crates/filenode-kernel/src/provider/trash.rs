//! Deletion with an optional recycle directory.
//!
//! Non-permanent deletes move the entry into a trash directory under a
//! collision-free name. When the move cannot happen (the trash lives on a
//! different device), the entry is removed permanently instead.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use super::DeletionProvider;
use crate::error::{FsError, FsResult};

/// [`DeletionProvider`] for the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDeleter {
    trash_dir: Option<PathBuf>,
}

impl LocalDeleter {
    /// Deleter moving non-permanent deletes into `trash_dir`.
    pub fn new(trash_dir: impl Into<PathBuf>) -> Self {
        Self {
            trash_dir: Some(trash_dir.into()),
        }
    }

    /// Deleter that always removes permanently.
    pub fn permanent_only() -> Self {
        Self { trash_dir: None }
    }

    /// Trash under the user's local data directory, if the platform has one.
    pub fn with_default_trash() -> Self {
        Self {
            trash_dir: default_trash_dir(),
        }
    }

    pub fn trash_dir(&self) -> Option<&Path> {
        self.trash_dir.as_deref()
    }

    async fn move_to_trash(&self, trash: &Path, path: &Path) -> FsResult<()> {
        fs::create_dir_all(trash)
            .await
            .map_err(|e| FsError::from_io(e, trash))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "entry".to_string());
        let target = trash.join(format!("{name}.{}", Uuid::new_v4().simple()));

        match fs::rename(path, &target).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), trash = %target.display(), "moved to trash");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                tracing::warn!(
                    path = %path.display(),
                    "trash is on another device, deleting permanently"
                );
                remove_permanently(path).await
            }
            Err(e) => Err(FsError::from_io(e, path)),
        }
    }
}

impl Default for LocalDeleter {
    fn default() -> Self {
        Self::with_default_trash()
    }
}

#[async_trait]
impl DeletionProvider for LocalDeleter {
    async fn remove(&self, path: &Path, permanent: bool) -> FsResult<()> {
        match (&self.trash_dir, permanent) {
            (Some(trash), false) => self.move_to_trash(trash, path).await,
            _ => remove_permanently(path).await,
        }
    }
}

/// `<data_local_dir>/filenode/trash`.
pub fn default_trash_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("filenode").join("trash"))
}

async fn remove_permanently(path: &Path) -> FsResult<()> {
    let meta = fs::symlink_metadata(path)
        .await
        .map_err(|e| FsError::from_io(e, path))?;
    let result = if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result.map_err(|e| FsError::from_io(e, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_permanent_removes_file_and_tree() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("nested")).unwrap();
        std::fs::write(tree.join("nested").join("g"), b"y").unwrap();

        let deleter = LocalDeleter::permanent_only();
        deleter.remove(&file, false).await.unwrap();
        deleter.remove(&tree, true).await.unwrap();
        assert!(!file.exists());
        assert!(!tree.exists());
    }

    #[tokio::test]
    async fn test_trash_keeps_both_copies() {
        let dir = TempDir::new().unwrap();
        let trash = dir.path().join(".trash");
        let deleter = LocalDeleter::new(&trash);

        for _ in 0..2 {
            let file = dir.path().join("same.txt");
            std::fs::write(&file, b"x").unwrap();
            deleter.remove(&file, false).await.unwrap();
            assert!(!file.exists());
        }

        let trashed: Vec<_> = std::fs::read_dir(&trash).unwrap().collect();
        assert_eq!(trashed.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_path() {
        let dir = TempDir::new().unwrap();
        let err = LocalDeleter::permanent_only()
            .remove(&dir.path().join("nope"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }
}
