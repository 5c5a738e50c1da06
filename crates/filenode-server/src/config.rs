//! Server configuration.
//!
//! Layers, lowest precedence first: built-in defaults, a TOML file, the
//! `FILENODE_*` environment variables, then command-line flags (applied by
//! the binary).
//!
//! ```toml
//! bind = "127.0.0.1"
//! port = 50051
//! hmac_secret = "change-me"
//! allowed_roots = ["/srv"]
//!
//! [[mounts]]
//! virtual_prefix = "/projects"
//! real_root = "/srv/projects"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use filenode_kernel::{MountConfig, NodeConfig};
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BIND_ADDRESS, DEFAULT_METRICS_INTERVAL, DEFAULT_PORT, ENV_HMAC_SECRET, ENV_PLATFORM,
    ENV_PORT, ENV_VERSION,
};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid mount {0:?}, expected /virtual=/real/path")]
    InvalidMount(String),

    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
}

/// Full server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub metrics_interval_secs: u64,
    #[serde(flatten)]
    pub node: NodeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            metrics_interval_secs: DEFAULT_METRICS_INTERVAL.as_secs(),
            node: NodeConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(secret) = lookup(ENV_HMAC_SECRET).filter(|s| !s.is_empty()) {
            self.node.hmac_secret = secret;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_PORT,
                value: port.clone(),
            })?;
        }
        if let Some(platform) = lookup(ENV_PLATFORM).filter(|s| !s.is_empty()) {
            self.node.platform = platform;
        }
        if let Some(version) = lookup(ENV_VERSION).filter(|s| !s.is_empty()) {
            self.node.version = version;
        }
        Ok(())
    }

    /// Socket address to listen on.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind, self.port)
            .parse::<SocketAddr>()
            .or_else(|_| format!("[{}]:{}", self.bind, self.port).parse::<SocketAddr>())
            .map_err(|_| ConfigError::InvalidAddress(self.bind.clone()))
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }
}

/// Parse a `--mount` argument of the form `/virtual=/real/path`.
pub fn parse_mount_spec(spec: &str) -> Result<MountConfig, ConfigError> {
    let (prefix, root) = spec
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidMount(spec.to_string()))?;
    if prefix.trim().is_empty() || root.trim().is_empty() {
        return Err(ConfigError::InvalidMount(spec.to_string()));
    }
    Ok(MountConfig {
        virtual_prefix: prefix.trim().to_string(),
        real_root: PathBuf::from(root.trim()),
    })
}
