//! Filenode error taxonomy.
//!
//! Every failure the kernel can produce maps onto exactly one [`ErrorKind`]
//! and one stable wire code. Transports translate the kind into their own
//! status codes; the wire code travels verbatim in `OperationResult`.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Coarse error classification shared with remote clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing/malformed path or parameters, bad tokens, bad offsets.
    InvalidArgument,
    /// The path does not exist.
    NotFound,
    /// OS-level denial, or the path lies outside the sandbox.
    PermissionDenied,
    /// Creation or rename target collision.
    AlreadyExists,
    /// Another process holds the file in exclusive use.
    FileLocked,
    /// Streaming concurrency cap reached.
    ResourceExhausted,
    /// The caller went away or asked to stop.
    Cancelled,
    /// Unexpected I/O failure.
    Internal,
}

/// Filenode error type.
#[derive(Debug, Error)]
pub enum FsError {
    /// Missing or malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The OS refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Path escapes the sandbox (traversal or outside allowed roots).
    #[error("path outside allowed roots: {0}")]
    OutsideRoot(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// File in use by another process.
    #[error("file is locked: {0}")]
    FileLocked(String),

    /// No streaming permit available.
    #[error("too many concurrent streams (limit {0})")]
    ResourceExhausted(usize),

    /// Resume token failed to decode, verify, or parse.
    #[error("invalid resume token")]
    InvalidResume,

    /// Page token failed to decode.
    #[error("invalid page token")]
    InvalidPageToken,

    /// Offset negative or past end of file.
    #[error("invalid offset {offset} for file of {size} bytes")]
    InvalidOffset { offset: i64, size: u64 },

    /// File was created but its initial content could not be written.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error that did not map onto a more specific kind.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other internal error.
    #[error("{0}")]
    Internal(String),
}

impl FsError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an OutsideRoot error.
    pub fn outside_root(path: impl Into<String>) -> Self {
        Self::OutsideRoot(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create an Internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map an I/O error raised while operating on `path`.
    ///
    /// Sharing violations are recognised by error code, not message text.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let display = path.display().to_string();
        if is_sharing_violation(&err) {
            return Self::FileLocked(display);
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(display),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(display),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(display),
            io::ErrorKind::NotADirectory => {
                Self::InvalidArgument(format!("not a directory: {display}"))
            }
            io::ErrorKind::IsADirectory => {
                Self::InvalidArgument(format!("is a directory: {display}"))
            }
            _ => Self::Io(err),
        }
    }

    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_)
            | Self::InvalidResume
            | Self::InvalidPageToken
            | Self::InvalidOffset { .. } => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied(_) | Self::OutsideRoot(_) => ErrorKind::PermissionDenied,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::FileLocked(_) => ErrorKind::FileLocked,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::WriteFailed(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "ERR_INVALID_ARGUMENT",
            Self::NotFound(_) => "ERR_NOT_FOUND",
            Self::PermissionDenied(_) => "ERR_PERMISSION_DENIED",
            Self::OutsideRoot(_) => "ERR_OUTSIDE_ROOT",
            Self::AlreadyExists(_) => "ERR_ALREADY_EXISTS",
            Self::FileLocked(_) => "ERR_FILE_LOCKED",
            Self::ResourceExhausted(_) => "ERR_RESOURCE_EXHAUSTED",
            Self::InvalidResume => "ERR_INVALID_RESUME_TOKEN",
            Self::InvalidPageToken => "ERR_INVALID_PAGE_TOKEN",
            Self::InvalidOffset { .. } => "ERR_INVALID_OFFSET",
            Self::WriteFailed(_) => "ERR_WRITE_FAILED",
            Self::Cancelled => "ERR_CANCELLED",
            Self::Io(_) | Self::Internal(_) => "ERR_INTERNAL",
        }
    }

    /// Returns true if this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(windows)]
fn is_sharing_violation(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(err.raw_os_error(), Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_sharing_violation(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ResourceBusy | io::ErrorKind::ExecutableFileBusy
    )
}

/// Filenode result type.
pub type FsResult<T> = Result<T, FsError>;
