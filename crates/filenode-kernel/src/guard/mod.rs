//! Access guard: sandbox validation, resume tokens, and path locks.
//!
//! - [`AccessGuard::validate_path`] rejects traversal and anything outside
//!   the configured allow-list
//! - [`TokenSigner`] mints and verifies resume tokens
//! - [`PathLockRegistry`] hands out per-path reader/writer locks

pub mod locks;
pub mod token;

use std::path::{Component, Path, PathBuf};

use crate::error::{FsError, FsResult};

pub use locks::{PathLock, PathLockRegistry, PathReadGuard, PathWriteGuard, canonical_key};
pub use token::{ResumePoint, TokenSigner, decode_page_token, encode_page_token};

/// Directories worth flagging when touched. Access is logged, not blocked.
#[cfg(windows)]
const SENSITIVE_DIRS: &[&str] = &[
    "\\windows\\system32",
    "\\windows\\syswow64",
    "\\program files",
    "\\programdata",
    "\\users\\default",
];

#[cfg(not(windows))]
const SENSITIVE_DIRS: &[&str] = &["/etc", "/proc", "/sys", "/boot", "/dev", "/root"];

/// Validates resolved paths and owns the shared lock registry and signer.
#[derive(Debug)]
pub struct AccessGuard {
    allowed_roots: Vec<PathBuf>,
    signer: TokenSigner,
    locks: PathLockRegistry,
}

impl AccessGuard {
    /// Create a guard. An empty `allowed_roots` allows any mounted path.
    pub fn new(secret: impl AsRef<[u8]>, allowed_roots: Vec<PathBuf>) -> Self {
        Self {
            allowed_roots,
            signer: TokenSigner::new(secret),
            locks: PathLockRegistry::new(),
        }
    }

    /// The configured allow-list.
    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Check a resolved host path against the sandbox rules.
    ///
    /// Any literal `..` segment is rejected outright, before cleaning. With
    /// an allow-list configured the path must lie under one of the roots
    /// (case-insensitive, whole segments); existing paths are also checked
    /// after symlink resolution.
    pub fn validate_path(&self, requested: &Path) -> FsResult<PathBuf> {
        if requested.as_os_str().is_empty() {
            return Err(FsError::invalid_argument("empty path"));
        }
        if requested.components().any(|c| c == Component::ParentDir) {
            return Err(FsError::outside_root(format!(
                "path traversal not allowed: {}",
                requested.display()
            )));
        }

        let absolute = std::path::absolute(requested)
            .map_err(|e| FsError::invalid_argument(format!("invalid path: {e}")))?;
        let cleaned: PathBuf = absolute
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();

        if !self.allowed_roots.is_empty() {
            if !self.within_allowed(&cleaned) {
                return Err(FsError::outside_root(cleaned.display().to_string()));
            }
            if let Ok(resolved) = dunce::canonicalize(&cleaned)
                && !self.within_allowed_canonical(&resolved)
            {
                return Err(FsError::outside_root(cleaned.display().to_string()));
            }
        }

        if is_sensitive(&cleaned) {
            tracing::warn!(path = %cleaned.display(), "access to sensitive system path");
        }

        Ok(cleaned)
    }

    fn within_allowed(&self, path: &Path) -> bool {
        self.allowed_roots
            .iter()
            .any(|root| starts_with_ignore_case(path, root))
    }

    fn within_allowed_canonical(&self, resolved: &Path) -> bool {
        self.allowed_roots.iter().any(|root| {
            let root = dunce::canonicalize(root).unwrap_or_else(|_| root.clone());
            starts_with_ignore_case(resolved, &root)
        })
    }

    /// Check a starting offset against the file size.
    ///
    /// `offset == size` is valid and yields an empty, completed stream.
    pub fn validate_offset(offset: i64, size: u64) -> FsResult<u64> {
        match u64::try_from(offset) {
            Ok(o) if o <= size => Ok(o),
            _ => Err(FsError::InvalidOffset { offset, size }),
        }
    }

    /// Shared lock for `path`.
    pub fn get_lock(&self, path: &Path) -> PathLock {
        self.locks.get_lock(path)
    }

    /// Best-effort removal of `path`'s registry entry.
    pub fn release_lock(&self, path: &Path) -> bool {
        self.locks.release_lock(path)
    }

    /// The lock registry.
    pub fn locks(&self) -> &PathLockRegistry {
        &self.locks
    }

    /// Mint a resume token.
    pub fn create_resume_token(&self, virtual_path: &str, offset: i64) -> String {
        self.signer.create_resume_token(virtual_path, offset)
    }

    /// Verify a resume token.
    pub fn validate_resume_token(&self, token: &str) -> FsResult<ResumePoint> {
        self.signer.validate_resume_token(token)
    }
}

fn starts_with_ignore_case(path: &Path, root: &Path) -> bool {
    let mut path_components = path.components();
    for root_component in root.components() {
        match path_components.next() {
            Some(c) => {
                let a = c.as_os_str().to_string_lossy().to_lowercase();
                let b = root_component.as_os_str().to_string_lossy().to_lowercase();
                if a != b {
                    return false;
                }
            }
            None => return false,
        }
    }
    true
}

fn is_sensitive(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    SENSITIVE_DIRS.iter().any(|dir| {
        if cfg!(windows) {
            lower.contains(dir)
        } else {
            lower == *dir || lower.starts_with(&format!("{dir}/"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_traversal_rejected() {
        let guard = AccessGuard::new("s", Vec::new());
        let err = guard.validate_path(Path::new("/srv/data/../../etc/passwd")).unwrap_err();
        assert!(matches!(err, FsError::OutsideRoot(_)));
    }

    #[test]
    fn test_empty_rejected() {
        let guard = AccessGuard::new("s", Vec::new());
        assert!(matches!(
            guard.validate_path(Path::new("")),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_no_allow_list_permits_any() {
        let guard = AccessGuard::new("s", Vec::new());
        let cleaned = guard.validate_path(Path::new("/srv/./data/file")).unwrap();
        assert_eq!(cleaned, PathBuf::from("/srv/data/file"));
    }

    #[test]
    fn test_allow_list() {
        let guard = AccessGuard::new("s", vec![PathBuf::from("/srv/data")]);
        assert!(guard.validate_path(Path::new("/srv/data/a.txt")).is_ok());
        assert!(guard.validate_path(Path::new("/SRV/Data/a.txt")).is_ok());
        assert!(matches!(
            guard.validate_path(Path::new("/srv/database/a.txt")),
            Err(FsError::OutsideRoot(_))
        ));
        assert!(matches!(
            guard.validate_path(Path::new("/etc/passwd")),
            Err(FsError::OutsideRoot(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_blocked() {
        let allowed = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(outside.path(), allowed.path().join("link")).unwrap();

        let guard = AccessGuard::new("s", vec![allowed.path().to_path_buf()]);
        let result = guard.validate_path(&allowed.path().join("link").join("secret.txt"));
        assert!(matches!(result, Err(FsError::OutsideRoot(_))));
    }

    #[test]
    fn test_validate_offset() {
        assert_eq!(AccessGuard::validate_offset(0, 10).unwrap(), 0);
        assert_eq!(AccessGuard::validate_offset(10, 10).unwrap(), 10);
        assert!(matches!(
            AccessGuard::validate_offset(11, 10),
            Err(FsError::InvalidOffset { .. })
        ));
        assert!(matches!(
            AccessGuard::validate_offset(-1, 10),
            Err(FsError::InvalidOffset { .. })
        ));
    }

    #[test]
    fn test_sensitive_detection() {
        #[cfg(not(windows))]
        {
            assert!(is_sensitive(Path::new("/etc/passwd")));
            assert!(!is_sensitive(Path::new("/etcetera")));
        }
    }
}
