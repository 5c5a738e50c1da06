//! Bounded admission for file streams.
//!
//! A fixed pool of permits; acquisition never waits. When the pool is empty
//! the caller gets [`FsError::ResourceExhausted`] and should retry later.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{FsError, FsResult};

/// Fixed-capacity permit pool.
#[derive(Debug, Clone)]
pub struct StreamGovernor {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One admitted stream. The slot frees when this drops.
#[derive(Debug)]
pub struct StreamPermit {
    _permit: OwnedSemaphorePermit,
}

impl StreamGovernor {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a permit or fail immediately.
    pub fn try_acquire(&self) -> FsResult<StreamPermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(StreamPermit { _permit: permit }),
            Err(_) => {
                tracing::warn!(capacity = self.capacity, "stream limit reached");
                Err(FsError::ResourceExhausted(self.capacity))
            }
        }
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
