//! Request and response types.
//!
//! These are transport-neutral: the server crate serializes them as-is, so
//! they derive serde and stay free of transport concerns.

use serde::{Deserialize, Serialize};

use crate::error::FsError;

/// A directory entry as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identifier (the virtual path).
    pub id: String,
    /// Final path component.
    pub name: String,
    /// Virtual path.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified_at_millis: i64,
    /// Extension without the dot; empty for directories.
    pub extension: String,
    pub mime_type: String,
    pub is_hidden: bool,
    pub is_readonly: bool,
}

/// Extended metadata returned by `stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub entry: Entry,
    pub created_at_millis: i64,
    pub accessed_at_millis: i64,
    /// True while any in-process operation holds the path's lock.
    pub is_locked: bool,
    pub locked_by: String,
    /// Always empty; checksums are computed elsewhere.
    pub checksum: String,
}

/// One piece of a file stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub data: Vec<u8>,
    /// Offset of `data[0]` within the file.
    pub offset: u64,
    pub total_size: u64,
    pub is_last: bool,
    /// Token for the next unread offset.
    pub resume_token: String,
}

/// Outcome of a unary mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    /// Empty on success.
    pub error_code: String,
}

impl OperationResult {
    /// Successful result with a message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: String::new(),
        }
    }

    /// Failed result carrying the error's wire code.
    pub fn failed(err: &FsError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error_code: err.code().to_string(),
        }
    }
}

impl From<Result<String, FsError>> for OperationResult {
    fn from(result: Result<String, FsError>) -> Self {
        match result {
            Ok(message) => Self::ok(message),
            Err(e) => Self::failed(&e),
        }
    }
}

/// Sort key for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Name,
    Size,
    Modified,
    /// By extension.
    Type,
}

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Parameters of a ListDir call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListDirRequest {
    pub path: String,
    /// Zero means the default page size.
    pub page_size: usize,
    /// Empty means the first page.
    pub page_token: String,
    pub show_hidden: bool,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl ListDirRequest {
    /// First page of `path` with default settings.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Parameters of a StreamFile call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamFileRequest {
    pub path: String,
    pub offset: i64,
    /// Zero streams to end of file.
    pub length: i64,
    /// Non-positive means the default chunk size.
    pub chunk_size: i64,
    /// Overrides `offset` when present.
    pub resume_token: String,
}

impl StreamFileRequest {
    /// Whole-file download of `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Returned when a listing stream completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSummary {
    /// Entries sent in this page.
    pub sent: usize,
    /// Entries in the filtered snapshot.
    pub total: usize,
    /// Token for the following page, if any entries remain.
    pub next_page_token: Option<String>,
}

/// Returned when a file stream completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub chunks: usize,
    pub bytes: u64,
    /// Offset following the last byte delivered.
    pub next_offset: u64,
}

/// A mountable volume reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub path: String,
    pub label: String,
    pub total_space: u64,
    pub free_space: u64,
    pub is_removable: bool,
}

/// Identity of this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
    pub platform: String,
    pub version: String,
    pub total_storage: u64,
    pub free_storage: u64,
}
