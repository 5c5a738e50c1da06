//! # filenode-server
//!
//! Exposes a [`filenode_kernel::FileNode`] over TCP using newline-delimited
//! JSON frames. See [`protocol`] for the frame format and [`listener`] for
//! connection handling.

pub mod config;
pub mod constants;
pub mod listener;
pub mod metrics;
pub mod protocol;

pub use config::{ConfigError, ServerConfig, parse_mount_spec};
pub use listener::Server;
pub use metrics::{MethodStats, Metrics};
pub use protocol::{Call, ClientFrame, ProtocolError, ServerFrame, WireChunk};
