//! Stream admission and planning.
//!
//! [`StreamGovernor`] bounds how many file streams run at once;
//! [`plan`] turns a request's offset/length/chunk size into a concrete
//! [`StreamPlan`] against the file's current size.

pub mod governor;
pub mod plan;

pub use governor::{StreamGovernor, StreamPermit};
pub use plan::{
    DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MAX_PREVIEW_SIZE, StreamMode, StreamPlan, plan,
};

/// Concurrent stream permits when unconfigured.
pub const DEFAULT_MAX_STREAMS: usize = 20;
