//! Kernel configuration.
//!
//! Deserializable from any serde format; the server reads it from TOML and
//! layers environment overrides on top.

use serde::Deserialize;
use std::path::PathBuf;

use crate::stream::DEFAULT_MAX_STREAMS;

/// Secret used when none is configured. Never appropriate outside development.
pub const DEV_HMAC_SECRET: &str = "default-dev-secret-do-not-use-in-prod";

/// Hard upper bound on entries returned in one listing page.
pub const MAX_ENTRIES_PER_PAGE: usize = 1000;

/// Page size used when the request leaves it unset.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// A virtual prefix to real root mapping created at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MountConfig {
    /// Client-visible prefix, e.g. `/projects`.
    pub virtual_prefix: String,
    /// Host directory the prefix maps onto.
    pub real_root: PathBuf,
}

/// Configuration for a [`FileNode`](crate::FileNode).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Key for resume-token signatures.
    pub hmac_secret: String,
    /// If non-empty, every resolved path must live under one of these.
    pub allowed_roots: Vec<PathBuf>,
    /// Mounts created at startup.
    pub mounts: Vec<MountConfig>,
    /// Seed additional mounts from the volume enumerator.
    pub auto_mount_volumes: bool,
    /// Streaming permits.
    pub max_concurrent_streams: usize,
    /// Entries considered per listing snapshot.
    pub max_listing_entries: usize,
    /// Where non-permanent deletes go. Defaults under the user data dir.
    pub trash_dir: Option<PathBuf>,
    /// Reported in device info.
    pub platform: String,
    /// Reported in device info.
    pub version: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            hmac_secret: DEV_HMAC_SECRET.to_string(),
            allowed_roots: Vec::new(),
            mounts: Vec::new(),
            auto_mount_volumes: false,
            max_concurrent_streams: DEFAULT_MAX_STREAMS,
            max_listing_entries: 2 * MAX_ENTRIES_PER_PAGE,
            trash_dir: None,
            platform: std::env::consts::OS.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl NodeConfig {
    /// Whether the signing secret is still the development default.
    pub fn uses_dev_secret(&self) -> bool {
        self.hmac_secret == DEV_HMAC_SECRET
    }

    /// Add a mount to the startup list.
    pub fn with_mount(mut self, virtual_prefix: impl Into<String>, real_root: impl Into<PathBuf>) -> Self {
        self.mounts.push(MountConfig {
            virtual_prefix: virtual_prefix.into(),
            real_root: real_root.into(),
        });
        self
    }

    /// Replace the signing secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.hmac_secret = secret.into();
        self
    }
}
