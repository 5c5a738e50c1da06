//! Create, delete and rename.
//!
//! Mutations report through [`OperationResult`] rather than `Err`, so a
//! batch delete can say how far it got. Each takes the affected path locks
//! in write mode, which waits out any stream reading the same path.

use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::FileNode;
use crate::error::{FsError, FsResult};
use crate::types::OperationResult;
use crate::vpath::{join_virtual, normalize_virtual};

impl FileNode {
    /// Create a directory, with parents if `recursive`.
    pub async fn create_dir(&self, path: &str, recursive: bool, cancel: &CancellationToken) -> OperationResult {
        report("create_dir", self.try_create_dir(path, recursive, cancel).await)
    }

    /// Create a new file holding `content`. Fails if the path exists.
    pub async fn create_file(&self, path: &str, content: &[u8], cancel: &CancellationToken) -> OperationResult {
        report("create_file", self.try_create_file(path, content, cancel).await)
    }

    /// Delete each path in order, stopping at the first failure.
    ///
    /// Paths that do not exist are skipped. Non-permanent deletes go to the
    /// deletion provider's recycle location.
    pub async fn delete(&self, paths: &[String], permanent: bool, cancel: &CancellationToken) -> OperationResult {
        if paths.is_empty() {
            return report("delete", Err(FsError::invalid_argument("no paths given")));
        }

        let mut deleted = 0;
        for path in paths {
            match self.delete_one(path, permanent, cancel).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %path, deleted, error = %e, "delete stopped");
                    return OperationResult {
                        success: false,
                        message: format!("{e} (deleted {deleted} of {})", paths.len()),
                        error_code: e.code().to_string(),
                    };
                }
            }
        }
        OperationResult::ok(format!("deleted {deleted} of {} items", paths.len()))
    }

    /// Rename the entry at `path` to `new_name` within its directory.
    pub async fn rename(&self, path: &str, new_name: &str, cancel: &CancellationToken) -> OperationResult {
        report("rename", self.try_rename(path, new_name, cancel).await)
    }

    async fn try_create_dir(&self, path: &str, recursive: bool, cancel: &CancellationToken) -> FsResult<String> {
        let virtual_path = normalize_virtual(path);
        let real = self.resolve(&virtual_path)?;
        let _guard = self.write_lock(&real, cancel).await?;

        let created = if recursive {
            fs::create_dir_all(&real).await
        } else {
            fs::create_dir(&real).await
        };
        created.map_err(|e| FsError::from_io(e, &real))?;

        tracing::info!(path = %virtual_path, recursive, "created directory");
        Ok(format!("created directory {virtual_path}"))
    }

    async fn try_create_file(&self, path: &str, content: &[u8], cancel: &CancellationToken) -> FsResult<String> {
        let virtual_path = normalize_virtual(path);
        let real = self.resolve(&virtual_path)?;
        let _guard = self.write_lock(&real, cancel).await?;

        if fs::try_exists(&real).await.unwrap_or(false) {
            return Err(FsError::already_exists(virtual_path));
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&real)
            .await
            .map_err(|e| FsError::from_io(e, &real))?;

        if !content.is_empty() {
            let written: std::io::Result<()> = async {
                file.write_all(content).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                return Err(FsError::WriteFailed(format!("{virtual_path}: {e}")));
            }
        }

        tracing::info!(path = %virtual_path, bytes = content.len(), "created file");
        Ok(format!("created file {virtual_path}"))
    }

    /// Returns `Ok(false)` when the path was already gone.
    async fn delete_one(&self, path: &str, permanent: bool, cancel: &CancellationToken) -> FsResult<bool> {
        let virtual_path = normalize_virtual(path);
        self.reject_mount_point(&virtual_path, "delete")?;
        let real = self.resolve(&virtual_path)?;
        let guard = self.write_lock(&real, cancel).await?;

        if !exists(&real).await {
            tracing::debug!(path = %virtual_path, "delete skipped missing path");
            return Ok(false);
        }
        self.deleter.remove(&real, permanent).await?;

        drop(guard);
        self.guard.release_lock(&real);
        tracing::info!(path = %virtual_path, permanent, "deleted");
        Ok(true)
    }

    async fn try_rename(&self, path: &str, new_name: &str, cancel: &CancellationToken) -> FsResult<String> {
        validate_name(new_name)?;

        let virtual_path = normalize_virtual(path);
        self.reject_mount_point(&virtual_path, "rename")?;
        let parent = match virtual_path.rsplit_once('/') {
            Some((parent, _)) => parent,
            None => "/",
        };
        let new_virtual = join_virtual(parent, new_name);

        let old_real = self.resolve(&virtual_path)?;
        let new_real = self.resolve(&new_virtual)?;

        let guards = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FsError::Cancelled),
            guards = self.guard.locks().write_pair(&old_real, &new_real) => guards,
        };

        if exists(&new_real).await {
            return Err(FsError::already_exists(new_virtual));
        }
        fs::rename(&old_real, &new_real)
            .await
            .map_err(|e| FsError::from_io(e, &old_real))?;

        drop(guards);
        self.guard.release_lock(&old_real);
        tracing::info!(from = %virtual_path, to = %new_virtual, "renamed");
        Ok(format!("renamed {virtual_path} to {new_virtual}"))
    }

    /// Mount roots belong to the mount table; clients cannot remove or
    /// rename them.
    fn reject_mount_point(&self, virtual_path: &str, op: &str) -> FsResult<()> {
        if self.translator.is_mount_point(virtual_path) {
            return Err(FsError::invalid_argument(format!(
                "cannot {op} mount point {virtual_path}"
            )));
        }
        Ok(())
    }
}

/// Whether anything, including a dangling symlink, sits at `path`.
async fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

/// A new name must be one path segment.
fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(FsError::invalid_argument(format!("invalid name: {name:?}")));
    }
    Ok(())
}

fn report(op: &str, result: FsResult<String>) -> OperationResult {
    if let Err(e) = &result {
        if e.is_cancelled() {
            tracing::debug!(op, "cancelled");
        } else {
            tracing::warn!(op, code = e.code(), error = %e, "operation failed");
        }
    }
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::provider::LocalDeleter;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (FileNode, TempDir) {
        let dir = TempDir::new().unwrap();
        let node = FileNode::new(NodeConfig::default().with_mount("/test", dir.path()))
            .unwrap()
            .with_deleter(Arc::new(LocalDeleter::permanent_only()));
        (node, dir)
    }

    #[tokio::test]
    async fn test_create_dir() {
        let (node, dir) = setup();
        let cancel = CancellationToken::new();

        assert!(node.create_dir("/test/a", false, &cancel).await.success);
        assert!(dir.path().join("a").is_dir());

        let result = node.create_dir("/test/x/y/z", false, &cancel).await;
        assert!(!result.success);
        assert_eq!(result.error_code, "ERR_NOT_FOUND");

        assert!(node.create_dir("/test/x/y/z", true, &cancel).await.success);
        assert!(dir.path().join("x/y/z").is_dir());

        let result = node.create_dir("/test/a", false, &cancel).await;
        assert_eq!(result.error_code, "ERR_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_create_file() {
        let (node, dir) = setup();
        let cancel = CancellationToken::new();

        let result = node.create_file("/test/hello.txt", b"hi there", &cancel).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(std::fs::read(dir.path().join("hello.txt")).unwrap(), b"hi there");

        let result = node.create_file("/test/hello.txt", b"", &cancel).await;
        assert!(!result.success);
        assert_eq!(result.error_code, "ERR_ALREADY_EXISTS");

        assert!(node.create_file("/test/empty", b"", &cancel).await.success);
        assert_eq!(std::fs::metadata(dir.path().join("empty")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_sandbox_failures_are_results() {
        let (node, _dir) = setup();
        let result = node
            .create_file("/test/../escape.txt", b"x", &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert_eq!(result.error_code, "ERR_OUTSIDE_ROOT");
    }

    #[tokio::test]
    async fn test_delete_batch() {
        let (node, dir) = setup();
        let cancel = CancellationToken::new();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::create_dir_all(dir.path().join("tree/inner")).unwrap();

        let paths = vec![
            "/test/a".to_string(),
            "/test/missing".to_string(),
            "/test/tree".to_string(),
        ];
        let result = node.delete(&paths, true, &cancel).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(result.message, "deleted 2 of 3 items");
        assert!(!dir.path().join("a").exists());
        assert!(!dir.path().join("tree").exists());
        assert!(node.guard().locks().is_empty());
    }

    #[tokio::test]
    async fn test_delete_stops_at_failure() {
        let (node, dir) = setup();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::write(dir.path().join("b"), b"").unwrap();

        let paths = vec![
            "/test/a".to_string(),
            "/elsewhere/x".to_string(),
            "/test/b".to_string(),
        ];
        let result = node.delete(&paths, true, &CancellationToken::new()).await;
        assert!(!result.success);
        assert_eq!(result.error_code, "ERR_NOT_FOUND");
        assert!(result.message.contains("deleted 1 of 3"));
        assert!(dir.path().join("b").exists());

        let result = node.delete(&[], true, &CancellationToken::new()).await;
        assert_eq!(result.error_code, "ERR_INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_rename() {
        let (node, dir) = setup();
        let cancel = CancellationToken::new();
        std::fs::write(dir.path().join("old.txt"), b"data").unwrap();
        std::fs::write(dir.path().join("taken.txt"), b"").unwrap();

        let result = node.rename("/test/old.txt", "taken.txt", &cancel).await;
        assert_eq!(result.error_code, "ERR_ALREADY_EXISTS");

        let result = node.rename("/test/old.txt", "new.txt", &cancel).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(std::fs::read(dir.path().join("new.txt")).unwrap(), b"data");
        assert!(!dir.path().join("old.txt").exists());

        for bad in ["", "..", "a/b", "a\\b"] {
            let result = node.rename("/test/new.txt", bad, &cancel).await;
            assert_eq!(result.error_code, "ERR_INVALID_ARGUMENT", "name {bad:?}");
        }

        let result = node.rename("/test/ghost", "x", &cancel).await;
        assert_eq!(result.error_code, "ERR_NOT_FOUND");
        assert!(node.guard().locks().is_empty());
    }

    #[tokio::test]
    async fn test_mount_point_cannot_be_deleted_or_renamed() {
        let (node, dir) = setup();
        let cancel = CancellationToken::new();
        std::fs::write(dir.path().join("keep.txt"), b"").unwrap();

        for path in ["/test", "/test/", "test"] {
            let result = node.delete(&[path.to_string()], true, &cancel).await;
            assert!(!result.success);
            assert_eq!(result.error_code, "ERR_INVALID_ARGUMENT", "path {path:?}");
        }
        assert!(dir.path().join("keep.txt").exists());

        let result = node.rename("/test", "moved", &cancel).await;
        assert_eq!(result.error_code, "ERR_INVALID_ARGUMENT");
        assert!(dir.path().is_dir());
        assert!(node.guard().locks().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_writer_aborts_on_cancel() {
        let (node, dir) = setup();
        std::fs::write(dir.path().join("busy"), b"").unwrap();
        let reader = node.guard().get_lock(&dir.path().join("busy")).read().await;

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            node.delete(&["/test/busy".to_string()], true, &cancel),
        )
        .await
        .expect("cancel must abort the lock wait");
        assert_eq!(result.error_code, "ERR_CANCELLED");
        assert!(dir.path().join("busy").exists());

        canceller.await.unwrap();
        drop(reader);
    }
}
