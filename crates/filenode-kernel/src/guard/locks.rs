//! Per-path reader/writer locks.
//!
//! Streams hold a path's lock in read mode; create, delete and rename hold
//! it in write mode. The registry hands out one shared lock per canonical
//! path and counts the handles referencing it, so an entry only disappears
//! once nobody holds or awaits it.
//!
//! # Deadlock Prevention
//!
//! Operations that need two paths (rename) lock them in lexicographic order
//! of their canonical keys; see [`PathLockRegistry::write_pair`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

struct LockEntry {
    lock: Arc<RwLock<()>>,
    holders: usize,
}

type LockMap = HashMap<PathBuf, LockEntry>;

/// Registry mapping canonical paths to shared reader/writer locks.
///
/// Cloning is cheap and yields a handle onto the same registry.
#[derive(Clone, Default)]
pub struct PathLockRegistry {
    entries: Arc<Mutex<LockMap>>,
}

impl std::fmt::Debug for PathLockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathLockRegistry")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl PathLockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for `path`, creating it if absent.
    ///
    /// Concurrent first accesses to the same path observe the same lock:
    /// get-or-create runs under the registry's own mutex.
    pub fn get_lock(&self, path: &Path) -> PathLock {
        let key = canonical_key(path);
        let lock = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_insert_with(|| LockEntry {
                lock: Arc::new(RwLock::new(())),
                holders: 0,
            });
            entry.holders += 1;
            Arc::clone(&entry.lock)
        };
        PathLock {
            key,
            lock,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Drop the registry entry for `path` if no handle references it.
    ///
    /// Returns `true` if an entry was removed. Entries still in use are left
    /// alone; they go away when their last handle drops.
    pub fn release_lock(&self, path: &Path) -> bool {
        let key = canonical_key(path);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if entry.holders == 0 => {
                entries.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Whether any handle currently references the lock for `path`.
    pub fn is_held(&self, path: &Path) -> bool {
        let key = canonical_key(path);
        self.entries
            .lock()
            .get(&key)
            .is_some_and(|entry| entry.holders > 0)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Acquire write locks on two paths in deterministic order.
    ///
    /// When both paths share a key only one lock is taken.
    pub async fn write_pair(&self, a: &Path, b: &Path) -> (PathWriteGuard, Option<PathWriteGuard>) {
        let first = self.get_lock(a);
        let second = self.get_lock(b);

        if first.key == second.key {
            drop(second);
            return (first.write().await, None);
        }

        let (low, high) = if first.key < second.key {
            (first, second)
        } else {
            (second, first)
        };
        let low_guard = low.write().await;
        let high_guard = high.write().await;
        (low_guard, Some(high_guard))
    }
}

/// Handle onto a registered path lock.
///
/// Holding the handle keeps the registry entry alive.
pub struct PathLock {
    key: PathBuf,
    lock: Arc<RwLock<()>>,
    entries: Arc<Mutex<LockMap>>,
}

impl std::fmt::Debug for PathLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathLock").field("key", &self.key).finish()
    }
}

impl PathLock {
    /// Canonical key this lock is registered under.
    pub fn key(&self) -> &Path {
        &self.key
    }

    /// Whether this handle and `other` share the same underlying lock.
    pub fn same_lock(&self, other: &PathLock) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }

    /// Acquire in shared mode.
    pub async fn read(self) -> PathReadGuard {
        let guard = Arc::clone(&self.lock).read_owned().await;
        PathReadGuard {
            _guard: guard,
            _handle: self,
        }
    }

    /// Acquire in exclusive mode.
    pub async fn write(self) -> PathWriteGuard {
        let guard = Arc::clone(&self.lock).write_owned().await;
        PathWriteGuard {
            _guard: guard,
            handle: self,
        }
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.holders = entry.holders.saturating_sub(1);
            if entry.holders == 0 && Arc::ptr_eq(&entry.lock, &self.lock) {
                entries.remove(&self.key);
            }
        }
    }
}

/// Shared hold on a path. Released on drop.
#[derive(Debug)]
pub struct PathReadGuard {
    // Field order matters: the guard must release before the handle
    // decrements the registry count.
    _guard: OwnedRwLockReadGuard<()>,
    _handle: PathLock,
}

/// Exclusive hold on a path. Released on drop.
#[derive(Debug)]
pub struct PathWriteGuard {
    _guard: OwnedRwLockWriteGuard<()>,
    handle: PathLock,
}

impl PathWriteGuard {
    /// Canonical key of the held path.
    pub fn key(&self) -> &Path {
        self.handle.key()
    }
}

/// Canonical registry key for `path`.
///
/// Existing paths are canonicalized; for a missing path the parent is
/// canonicalized and the file name appended, so a file keeps the same key
/// before and after it is created. Falls back to a lexical clean. Keys are
/// case-folded on Windows, where the filesystem is case-insensitive.
pub fn canonical_key(path: &Path) -> PathBuf {
    fold_case(resolve_key(path))
}

fn resolve_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = dunce::canonicalize(path) {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name())
        && let Ok(parent) = dunce::canonicalize(parent)
    {
        return parent.join(name);
    }
    lexical_clean(path)
}

#[cfg(windows)]
fn fold_case(key: PathBuf) -> PathBuf {
    PathBuf::from(key.to_string_lossy().to_lowercase())
}

#[cfg(not(windows))]
fn fold_case(key: PathBuf) -> PathBuf {
    key
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_same_path_same_lock() {
        let registry = PathLockRegistry::new();
        let a = registry.get_lock(Path::new("/nonexistent/dir/file.txt"));
        let b = registry.get_lock(Path::new("/nonexistent/dir/./file.txt"));
        assert!(a.same_lock(&b));
        assert_eq!(registry.len(), 1);
    }

    #[cfg(windows)]
    #[test]
    fn test_keys_ignore_case() {
        let registry = PathLockRegistry::new();
        let a = registry.get_lock(Path::new("C:\\Nonexistent\\Dir\\File.TXT"));
        let b = registry.get_lock(Path::new("c:\\nonexistent\\dir\\file.txt"));
        assert!(a.same_lock(&b));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_keys_keep_case() {
        let registry = PathLockRegistry::new();
        let a = registry.get_lock(Path::new("/nonexistent/Dir/File.TXT"));
        let b = registry.get_lock(Path::new("/nonexistent/dir/file.txt"));
        assert!(!a.same_lock(&b));
    }

    #[test]
    fn test_concurrent_get_or_create() {
        let registry = PathLockRegistry::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get_lock(Path::new("/race/target")))
            })
            .collect();
        let locks: Vec<PathLock> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for lock in &locks[1..] {
            assert!(locks[0].same_lock(lock));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_entry_removed_when_last_handle_drops() {
        let registry = PathLockRegistry::new();
        let a = registry.get_lock(Path::new("/x/y"));
        let b = registry.get_lock(Path::new("/x/y"));
        drop(a);
        assert!(registry.is_held(Path::new("/x/y")));
        drop(b);
        assert!(!registry.is_held(Path::new("/x/y")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_skips_held_entries() {
        let registry = PathLockRegistry::new();
        let held = registry.get_lock(Path::new("/x/y"));
        assert!(!registry.release_lock(Path::new("/x/y")));
        assert_eq!(registry.len(), 1);
        drop(held);
        assert!(!registry.release_lock(Path::new("/x/y")));
    }

    #[test]
    fn test_key_stable_across_creation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("later.txt");
        let before = canonical_key(&path);
        std::fs::write(&path, b"x").unwrap();
        let after = canonical_key(&path);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_readers_share() {
        let registry = PathLockRegistry::new();
        let r1 = registry.get_lock(Path::new("/f")).read().await;
        let r2 = tokio::time::timeout(
            Duration::from_millis(100),
            registry.get_lock(Path::new("/f")).read(),
        )
        .await;
        assert!(r2.is_ok());
        drop(r1);
    }

    #[tokio::test]
    async fn test_writer_waits_for_reader() {
        let registry = PathLockRegistry::new();
        let reader = registry.get_lock(Path::new("/f")).read().await;

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            registry.get_lock(Path::new("/f")).write(),
        )
        .await;
        assert!(blocked.is_err());

        let writer = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_lock(Path::new("/f")).write().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        drop(reader);
        let guard = tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer should proceed once the reader releases")
            .unwrap();
        drop(guard);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_write_pair_opposite_orders() {
        let registry = PathLockRegistry::new();
        let mut tasks = Vec::new();
        for i in 0..20 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (a, b) = if i % 2 == 0 {
                    (Path::new("/swap/a"), Path::new("/swap/b"))
                } else {
                    (Path::new("/swap/b"), Path::new("/swap/a"))
                };
                let guards = registry.write_pair(a, b).await;
                tokio::task::yield_now().await;
                drop(guards);
            }));
        }
        tokio::time::timeout(Duration::from_secs(5), async {
            for task in tasks {
                task.await.unwrap();
            }
        })
        .await
        .expect("swapped renames must not deadlock");
    }

    #[tokio::test]
    async fn test_write_pair_same_path() {
        let registry = PathLockRegistry::new();
        let (_guard, second) = registry.write_pair(Path::new("/s"), Path::new("/s")).await;
        assert!(second.is_none());
    }
}
