//! Virtual path translation with longest-prefix routing.
//!
//! Clients see paths like `/projects/app/src/main.rs`; the host sees
//! `/srv/code/app/src/main.rs`. The translator owns the mount table and a
//! reverse index from real roots back to virtual prefixes.
//!
//! When two prefixes both match (say `/a` and `/a/b`), the longest one wins,
//! so `/a/b/c` routes through `/a/b`.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use crate::error::{FsError, FsResult};

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Normalized virtual prefix (e.g. `/projects`).
    pub virtual_prefix: String,
    /// Host directory backing the prefix.
    pub real_root: PathBuf,
}

#[derive(Debug, Default)]
struct Mounts {
    /// Virtual prefix -> real root.
    forward: BTreeMap<String, PathBuf>,
    /// Real root -> every virtual prefix mounted on it.
    reverse: BTreeMap<PathBuf, BTreeSet<String>>,
}

impl Mounts {
    /// Drop `prefix` from `root`'s reverse entry, keeping other prefixes
    /// still mounted on the same root.
    fn unlink(&mut self, root: &Path, prefix: &str) {
        if let Some(prefixes) = self.reverse.get_mut(root) {
            prefixes.remove(prefix);
            if prefixes.is_empty() {
                self.reverse.remove(root);
            }
        }
    }
}

/// Bidirectional virtual/real path mapper. This is the sandbox boundary.
#[derive(Debug, Default)]
pub struct PathTranslator {
    mounts: RwLock<Mounts>,
}

impl PathTranslator {
    /// Create an empty translator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `virtual_prefix` onto `real_root`.
    ///
    /// Re-mounting an existing prefix replaces its root.
    pub fn mount(&self, virtual_prefix: &str, real_root: impl AsRef<Path>) -> FsResult<()> {
        let prefix = normalize_virtual(virtual_prefix);
        if prefix == "/" {
            return Err(FsError::invalid_argument("virtual prefix cannot be empty"));
        }

        let root = clean_real(real_root.as_ref());
        if root.as_os_str().is_empty() {
            return Err(FsError::invalid_argument("real root cannot be empty"));
        }

        let mut mounts = self.mounts.write();
        if let Some(old_root) = mounts.forward.insert(prefix.clone(), root.clone()) {
            mounts.unlink(&old_root, &prefix);
        }
        mounts.reverse.entry(root.clone()).or_default().insert(prefix.clone());
        tracing::info!(prefix = %prefix, root = %root.display(), "mounted");
        Ok(())
    }

    /// Remove the mount at `virtual_prefix`.
    ///
    /// Returns `true` if a mount was removed.
    pub fn unmount(&self, virtual_prefix: &str) -> bool {
        let prefix = normalize_virtual(virtual_prefix);
        let mut mounts = self.mounts.write();
        match mounts.forward.remove(&prefix) {
            Some(root) => {
                mounts.unlink(&root, &prefix);
                true
            }
            None => false,
        }
    }

    /// Whether `virtual_path` names a mount point itself.
    pub fn is_mount_point(&self, virtual_path: &str) -> bool {
        let normalized = normalize_virtual(virtual_path);
        self.mounts.read().forward.contains_key(&normalized)
    }

    /// All mounts, ordered by prefix.
    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .read()
            .forward
            .iter()
            .map(|(prefix, root)| MountInfo {
                virtual_prefix: prefix.clone(),
                real_root: root.clone(),
            })
            .collect()
    }

    /// Translate a virtual path into a host path.
    ///
    /// The bare root is rejected: clients must address a mount point. The
    /// remainder is joined segment by segment, so any `..` survives into
    /// the result for the access guard to reject.
    pub fn to_real(&self, virtual_path: &str) -> FsResult<PathBuf> {
        let normalized = normalize_virtual(virtual_path);
        if normalized == "/" {
            return Err(FsError::invalid_argument(
                "root listing not allowed, specify a mount point",
            ));
        }

        let mounts = self.mounts.read();
        let (prefix, root) = mounts
            .forward
            .iter()
            .filter(|(prefix, _)| is_segment_prefix(prefix, &normalized))
            .max_by_key(|(prefix, _)| prefix.len())
            .ok_or_else(|| FsError::not_found(format!("no mount for path: {normalized}")))?;

        let mut real = root.clone();
        for segment in normalized[prefix.len()..].split('/').filter(|s| !s.is_empty()) {
            real.push(segment);
        }
        Ok(real)
    }

    /// Translate a host path back into its virtual form.
    ///
    /// Paths no mount owns come back unchanged; callers treat that as an
    /// unmapped display value, not an error.
    pub fn to_virtual(&self, real_path: &Path) -> String {
        let real = clean_real(real_path);
        let mounts = self.mounts.read();
        let best = mounts
            .reverse
            .iter()
            .filter(|(root, _)| real.starts_with(root))
            .max_by_key(|(root, _)| root.components().count())
            .and_then(|(root, prefixes)| Some((root, prefixes.first()?)));

        match best {
            Some((root, prefix)) => {
                let rest: Vec<String> = real
                    .strip_prefix(root)
                    .map(|rest| {
                        rest.components()
                            .map(|c| c.as_os_str().to_string_lossy().into_owned())
                            .collect()
                    })
                    .unwrap_or_default();
                if rest.is_empty() {
                    prefix.clone()
                } else {
                    format!("{}/{}", prefix, rest.join("/"))
                }
            }
            None => real.to_string_lossy().into_owned(),
        }
    }
}

/// Normalize a client path: forward slashes, leading `/`, no trailing `/`,
/// no empty or `.` segments. `..` is kept verbatim.
pub fn normalize_virtual(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let segments: Vec<&str> = replaced
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

/// Join a child name onto a virtual directory path.
pub fn join_virtual(dir: &str, name: &str) -> String {
    let dir = normalize_virtual(dir);
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn clean_real(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
