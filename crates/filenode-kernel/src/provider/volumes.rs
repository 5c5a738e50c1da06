//! Volume discovery.
//!
//! On Unix the filesystem root and the user's home directory are reported,
//! with capacity from `statvfs`. On Windows every present drive letter is
//! reported.

use std::path::Path;

use super::VolumeEnumerator;
use crate::types::Volume;

/// [`VolumeEnumerator`] for the local host.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalVolumes;

impl LocalVolumes {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeEnumerator for LocalVolumes {
    #[cfg(unix)]
    fn volumes(&self) -> Vec<Volume> {
        let mut volumes = vec![volume("/", "/", "Root")];
        if let Some(home) = dirs::home_dir()
            && home != Path::new("/")
        {
            volumes.push(volume("home", &home.to_string_lossy(), "Home"));
        }
        volumes
    }

    #[cfg(windows)]
    fn volumes(&self) -> Vec<Volume> {
        (b'A'..=b'Z')
            .map(char::from)
            .filter_map(|letter| {
                let path = format!("{letter}:\\");
                Path::new(&path)
                    .exists()
                    .then(|| volume(&format!("{letter}:"), &path, "Local Disk"))
            })
            .collect()
    }

    #[cfg(not(any(unix, windows)))]
    fn volumes(&self) -> Vec<Volume> {
        Vec::new()
    }
}

fn volume(name: &str, path: &str, label: &str) -> Volume {
    let (total_space, free_space) = capacity(Path::new(path));
    Volume {
        name: name.to_string(),
        path: path.to_string(),
        label: label.to_string(),
        total_space,
        free_space,
        is_removable: false,
    }
}

#[cfg(unix)]
fn capacity(path: &Path) -> (u64, u64) {
    match rustix::fs::statvfs(path) {
        Ok(stat) => (
            stat.f_blocks.saturating_mul(stat.f_frsize),
            stat.f_bavail.saturating_mul(stat.f_frsize),
        ),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "statvfs failed");
            (0, 0)
        }
    }
}

#[cfg(not(unix))]
fn capacity(_path: &Path) -> (u64, u64) {
    (0, 0)
}

/// Virtual prefix a volume is mounted under when volumes seed the mount
/// table: `C:` becomes `/drive_c`, `/` becomes `/root`, the home directory
/// becomes `/home`.
pub fn mount_prefix_for(volume: &Volume) -> String {
    let name = volume.name.trim_end_matches(':');
    if volume.path == "/" {
        "/root".to_string()
    } else if name.len() == 1 && name.chars().all(|c| c.is_ascii_alphabetic()) {
        format!("/drive_{}", name.to_ascii_lowercase())
    } else {
        format!("/{}", name.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, path: &str) -> Volume {
        Volume {
            name: name.to_string(),
            path: path.to_string(),
            label: String::new(),
            total_space: 0,
            free_space: 0,
            is_removable: false,
        }
    }

    #[test]
    fn test_mount_prefixes() {
        assert_eq!(mount_prefix_for(&named("C:", "C:\\")), "/drive_c");
        assert_eq!(mount_prefix_for(&named("/", "/")), "/root");
        assert_eq!(mount_prefix_for(&named("home", "/home/u")), "/home");
    }

    #[cfg(unix)]
    #[test]
    fn test_root_volume_reported() {
        let volumes = LocalVolumes::new().volumes();
        let root = volumes.iter().find(|v| v.path == "/").unwrap();
        assert!(root.total_space >= root.free_space);
    }
}
