//! Server configuration constants.

use std::time::Duration;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 50051;

/// Default bind address (localhost only).
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// How often request metrics are logged.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// Longest accepted request line. Sized for base64 file content.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Frames buffered per connection before the writer applies backpressure.
pub const OUTBOUND_BUFFER: usize = 64;

/// Items buffered between a streaming call and the connection writer.
pub const STREAM_BUFFER: usize = 8;

/// Environment variable overriding the signing secret.
pub const ENV_HMAC_SECRET: &str = "FILENODE_HMAC_SECRET";

/// Environment variable overriding the port.
pub const ENV_PORT: &str = "FILENODE_PORT";

/// Environment variable overriding the reported platform.
pub const ENV_PLATFORM: &str = "FILENODE_PLATFORM";

/// Environment variable overriding the reported version.
pub const ENV_VERSION: &str = "FILENODE_VERSION";
