//! Host collaborators the orchestrator calls into.
//!
//! The node never touches platform APIs for metadata, deletion or volume
//! discovery directly; it goes through these traits so tests can swap in
//! fakes and platforms can differ behind one interface.

pub mod local;
pub mod trash;
pub mod volumes;

use async_trait::async_trait;
use std::path::Path;

use crate::error::FsResult;
use crate::types::Volume;

pub use local::LocalMetadata;
pub use trash::LocalDeleter;
pub use volumes::{LocalVolumes, mount_prefix_for};

/// Metadata snapshot of one host path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub is_dir: bool,
    pub size: u64,
    pub modified_millis: i64,
    pub created_millis: i64,
    pub accessed_millis: i64,
    pub is_readonly: bool,
    /// Platform hidden attribute. Dotfile naming is checked separately.
    pub is_hidden: bool,
}

/// Stat, directory reads and content classification.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Metadata for `path`, following symlinks.
    async fn stat(&self, path: &Path) -> FsResult<FileMeta>;

    /// Names of at most `limit` entries in `path`, in directory order.
    ///
    /// Dotfiles are skipped unless `show_hidden` is set.
    async fn read_dir(&self, path: &Path, show_hidden: bool, limit: usize) -> FsResult<Vec<String>>;

    /// Best-effort MIME type. Never fails.
    async fn mime_type(&self, path: &Path) -> String;
}

/// Removal of files and directory trees.
#[async_trait]
pub trait DeletionProvider: Send + Sync {
    /// Remove `path`. With `permanent` unset the entry goes to the
    /// platform's recycle location when one is available.
    async fn remove(&self, path: &Path, permanent: bool) -> FsResult<()>;
}

/// Discovery of mountable volumes.
pub trait VolumeEnumerator: Send + Sync {
    fn volumes(&self) -> Vec<Volume>;
}
