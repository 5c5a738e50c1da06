//! The request orchestrator.
//!
//! [`FileNode`] is the single context object a process builds at startup.
//! It owns the mount table, the access guard (with its lock registry and
//! token signer), the stream governor and the host collaborators, and
//! exposes every client operation:
//!
//! | Operation        | Module        | Locking            |
//! |------------------|---------------|--------------------|
//! | `list_dir`       | [`listing`]   | none (snapshot)    |
//! | `stat`           | [`listing`]   | none (snapshot)    |
//! | `stream_file`    | [`streaming`] | read, whole stream |
//! | `create_dir`     | [`mutation`]  | write              |
//! | `create_file`    | [`mutation`]  | write              |
//! | `delete`         | [`mutation`]  | write, per path    |
//! | `rename`         | [`mutation`]  | write, both paths  |
//!
//! Streaming operations push items into a `tokio::sync::mpsc::Sender` and
//! observe a [`CancellationToken`] at every send and every read. A dropped
//! receiver counts as cancellation.

mod listing;
mod mutation;
mod streaming;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::device;
use crate::error::{FsError, FsResult};
use crate::guard::{AccessGuard, PathWriteGuard};
use crate::provider::{
    DeletionProvider, LocalDeleter, LocalMetadata, LocalVolumes, MetadataProvider,
    VolumeEnumerator, mount_prefix_for,
};
use crate::stream::StreamGovernor;
use crate::types::{DeviceInfo, Volume};
use crate::vpath::{MountInfo, PathTranslator};

/// Process-wide filesystem node.
pub struct FileNode {
    config: NodeConfig,
    translator: PathTranslator,
    guard: AccessGuard,
    governor: StreamGovernor,
    metadata: Arc<dyn MetadataProvider>,
    deleter: Arc<dyn DeletionProvider>,
    volumes: Arc<dyn VolumeEnumerator>,
    device_id_path: Option<PathBuf>,
    device_id: OnceLock<String>,
}

impl std::fmt::Debug for FileNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileNode")
            .field("mounts", &self.translator.list_mounts())
            .field("governor", &self.governor)
            .field("locks", self.guard.locks())
            .finish_non_exhaustive()
    }
}

impl FileNode {
    /// Build a node with local collaborators and the configured mounts.
    pub fn new(config: NodeConfig) -> FsResult<Self> {
        if config.max_concurrent_streams == 0 {
            return Err(FsError::invalid_argument(
                "max_concurrent_streams must be at least 1",
            ));
        }

        let translator = PathTranslator::new();
        for mount in &config.mounts {
            translator.mount(&mount.virtual_prefix, &mount.real_root)?;
        }

        let deleter = match &config.trash_dir {
            Some(dir) => LocalDeleter::new(dir),
            None => LocalDeleter::with_default_trash(),
        };

        let node = Self {
            guard: AccessGuard::new(&config.hmac_secret, config.allowed_roots.clone()),
            governor: StreamGovernor::new(config.max_concurrent_streams),
            translator,
            metadata: Arc::new(LocalMetadata::new()),
            deleter: Arc::new(deleter),
            volumes: Arc::new(LocalVolumes::new()),
            device_id_path: device::default_device_id_path(),
            device_id: OnceLock::new(),
            config,
        };

        if node.config.auto_mount_volumes {
            let seeded = node.mount_volumes()?;
            tracing::info!(count = seeded, "seeded mounts from volumes");
        }

        Ok(node)
    }

    /// Replace the metadata provider.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the deletion provider.
    pub fn with_deleter(mut self, deleter: Arc<dyn DeletionProvider>) -> Self {
        self.deleter = deleter;
        self
    }

    /// Replace the volume enumerator. Mounts already seeded are kept.
    pub fn with_volumes(mut self, volumes: Arc<dyn VolumeEnumerator>) -> Self {
        self.volumes = volumes;
        self
    }

    /// Where the device id is persisted. `None` keeps it in memory.
    pub fn with_device_id_path(mut self, path: Option<PathBuf>) -> Self {
        self.device_id_path = path;
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn governor(&self) -> &StreamGovernor {
        &self.governor
    }

    // ========================================================================
    // Mounts
    // ========================================================================

    pub fn mount(&self, virtual_prefix: &str, real_root: impl AsRef<Path>) -> FsResult<()> {
        self.translator.mount(virtual_prefix, real_root)
    }

    pub fn unmount(&self, virtual_prefix: &str) -> bool {
        self.translator.unmount(virtual_prefix)
    }

    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.translator.list_mounts()
    }

    /// Mount every enumerated volume under its conventional prefix,
    /// leaving prefixes that are already mounted alone.
    pub fn mount_volumes(&self) -> FsResult<usize> {
        let existing: Vec<String> = self
            .translator
            .list_mounts()
            .into_iter()
            .map(|m| m.virtual_prefix)
            .collect();

        let mut seeded = 0;
        for volume in self.volumes.volumes() {
            let prefix = mount_prefix_for(&volume);
            if existing.contains(&prefix) {
                continue;
            }
            self.translator.mount(&prefix, &volume.path)?;
            seeded += 1;
        }
        Ok(seeded)
    }

    // ========================================================================
    // Host information
    // ========================================================================

    /// Volumes reported by the enumerator.
    pub fn get_drives(&self) -> Vec<Volume> {
        self.volumes.volumes()
    }

    /// Identity and storage totals of this node.
    pub fn device_info(&self) -> DeviceInfo {
        let id = self
            .device_id
            .get_or_init(|| device::load_or_create_device_id(self.device_id_path.as_deref()));
        device::device_info(id, &self.config, &self.volumes.volumes())
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    /// Translate a virtual path and validate the result.
    pub fn resolve(&self, virtual_path: &str) -> FsResult<PathBuf> {
        let real = self.translator.to_real(virtual_path)?;
        self.guard.validate_path(&real)
    }

    /// Take `real`'s write lock, giving up if `cancel` fires first.
    async fn write_lock(&self, real: &Path, cancel: &CancellationToken) -> FsResult<PathWriteGuard> {
        let lock = self.guard.get_lock(real);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FsError::Cancelled),
            guard = lock.write() => Ok(guard),
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> FsResult<()> {
    if cancel.is_cancelled() {
        Err(FsError::Cancelled)
    } else {
        Ok(())
    }
}

/// Send one item, failing with [`FsError::Cancelled`] if the token fires or
/// the receiver is gone.
async fn send_item<T>(sink: &mpsc::Sender<T>, item: T, cancel: &CancellationToken) -> FsResult<()> {
    check_cancelled(cancel)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FsError::Cancelled),
        sent = sink.send(item) => sent.map_err(|_| FsError::Cancelled),
    }
}

/// Final segment of a normalized virtual path.
fn virtual_name(virtual_path: &str) -> &str {
    virtual_path.rsplit('/').next().unwrap_or(virtual_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use tempfile::TempDir;

    struct FixedVolumes(Vec<Volume>);

    impl VolumeEnumerator for FixedVolumes {
        fn volumes(&self) -> Vec<Volume> {
            self.0.clone()
        }
    }

    fn volume(name: &str, path: &Path, total: u64) -> Volume {
        Volume {
            name: name.to_string(),
            path: path.to_string_lossy().into_owned(),
            label: String::new(),
            total_space: total,
            free_space: total / 2,
            is_removable: false,
        }
    }

    #[test]
    fn test_new_applies_mounts() {
        let dir = TempDir::new().unwrap();
        let node = FileNode::new(NodeConfig::default().with_mount("/data", dir.path())).unwrap();
        assert_eq!(node.list_mounts().len(), 1);
        assert_eq!(node.resolve("/data").unwrap(), dir.path());
    }

    #[test]
    fn test_zero_streams_rejected() {
        let config = NodeConfig {
            max_concurrent_streams: 0,
            ..Default::default()
        };
        assert!(matches!(FileNode::new(config), Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let node = FileNode::new(NodeConfig::default().with_mount("/data", dir.path())).unwrap();
        assert!(matches!(
            node.resolve("/data/../../etc/passwd"),
            Err(FsError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_mount_volumes_skips_existing() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let node = FileNode::new(NodeConfig::default().with_mount("/drive_c", a.path()))
            .unwrap()
            .with_volumes(Arc::new(FixedVolumes(vec![
                volume("C:", a.path(), 10),
                volume("D:", b.path(), 10),
            ])));

        assert_eq!(node.mount_volumes().unwrap(), 1);
        assert_eq!(node.resolve("/drive_d").unwrap(), b.path());
    }

    #[test]
    fn test_device_info() {
        let dir = TempDir::new().unwrap();
        let node = FileNode::new(NodeConfig::default())
            .unwrap()
            .with_volumes(Arc::new(FixedVolumes(vec![volume("/", dir.path(), 100)])))
            .with_device_id_path(Some(dir.path().join("device_id")));

        let info = node.device_info();
        assert_eq!(info.total_storage, 100);
        assert_eq!(info.free_storage, 50);
        assert_eq!(node.device_info().device_id, info.device_id);
        assert_eq!(node.get_drives().len(), 1);
    }

    #[test]
    fn test_virtual_name() {
        assert_eq!(virtual_name("/data/a/b.txt"), "b.txt");
        assert_eq!(virtual_name("/data"), "data");
    }
}
