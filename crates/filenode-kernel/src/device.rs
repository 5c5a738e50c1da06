//! Device identity.
//!
//! The device id is a UUIDv4 generated once and persisted under the user
//! config directory (`<config_dir>/filenode/device_id`), so it survives
//! restarts. If the directory is unavailable a fresh id is used for this
//! process only.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::types::{DeviceInfo, Volume};

const DEVICE_ID_FILE: &str = "device_id";

/// Default location of the persisted device id.
pub fn default_device_id_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("filenode").join(DEVICE_ID_FILE))
}

/// Read the id stored at `path`, creating and persisting one if absent.
pub fn load_or_create_device_id(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return Uuid::new_v4().to_string();
    };

    if let Ok(existing) = std::fs::read_to_string(path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return existing.to_string();
        }
    }

    let id = Uuid::new_v4().to_string();
    let persisted = path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::write(path, &id));
    if let Err(e) = persisted {
        tracing::warn!(path = %path.display(), error = %e, "could not persist device id");
    }
    id
}

/// Host name, or `"unknown"`.
pub fn device_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Assemble device info from the persisted id and the current volumes.
pub fn device_info(device_id: &str, config: &NodeConfig, volumes: &[Volume]) -> DeviceInfo {
    DeviceInfo {
        device_id: device_id.to_string(),
        device_name: device_name(),
        platform: config.platform.clone(),
        version: config.version.clone(),
        total_storage: volumes.iter().map(|v| v.total_space).sum(),
        free_storage: volumes.iter().map(|v| v.free_space).sum(),
    }
}
