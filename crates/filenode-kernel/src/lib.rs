//! # filenode-kernel
//!
//! Sandboxed remote access to a host filesystem.
//!
//! Clients address files by *virtual* paths (`/projects/app/main.rs`). The
//! kernel translates them through a mount table onto real host paths,
//! validates the result against the sandbox rules, and only then touches
//! the filesystem. On top of that it provides:
//!
//! - Paginated, sorted directory listings streamed entry by entry
//! - Chunked file streaming with HMAC-signed resume tokens
//! - Per-path reader/writer locks, so a delete or rename waits out any
//!   stream reading the same file
//! - Bounded admission for concurrent streams
//!
//! [`FileNode`] is the entry point. Transports (see `filenode-server`)
//! build one at startup and share it across connections.

pub mod config;
pub mod device;
pub mod error;
pub mod guard;
pub mod node;
pub mod provider;
pub mod stream;
pub mod types;
pub mod vpath;

pub use config::{DEFAULT_PAGE_SIZE, DEV_HMAC_SECRET, MAX_ENTRIES_PER_PAGE, MountConfig, NodeConfig};
pub use error::{ErrorKind, FsError, FsResult};
pub use guard::{AccessGuard, PathLockRegistry, ResumePoint, TokenSigner};
pub use node::FileNode;
pub use provider::{
    DeletionProvider, FileMeta, LocalDeleter, LocalMetadata, LocalVolumes, MetadataProvider,
    VolumeEnumerator,
};
pub use stream::{StreamGovernor, StreamMode, StreamPlan};
pub use types::{
    Chunk, DeviceInfo, Entry, FileInfo, ListDirRequest, ListSummary, OperationResult, SortBy,
    SortOrder, StreamFileRequest, StreamSummary, Volume,
};
pub use vpath::{MountInfo, PathTranslator};

pub use tokio_util::sync::CancellationToken;
