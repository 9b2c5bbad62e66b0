//! Worker pool
//!
//! A fixed number of execution slots shared by every chain. Iterations of
//! different chains run concurrently up to the pool size; a due iteration
//! that finds no free slot waits, and is rejected with
//! [`SchedulerError::ResourceExhausted`] if the wait exceeds its bound.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::scheduler::{Result, SchedulerError};

/// Bounded pool of execution slots
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Create a pool with `size` slots
    pub fn new(size: usize) -> Self {
        Self {
            size,
            semaphore: Arc::new(Semaphore::new(size)),
        }
    }

    /// Acquire a slot, waiting at most `bound` for one to free up.
    pub async fn acquire(&self, bound: Duration) -> Result<WorkerPermit> {
        match tokio::time::timeout(bound, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => {
                debug!(available = self.available_slots(), "Worker slot acquired");
                Ok(WorkerPermit { _permit: permit })
            }
            Ok(Err(_)) => Err(SchedulerError::ShuttingDown),
            Err(_) => {
                warn!(
                    pool_size = self.size,
                    waited_ms = bound.as_millis() as u64,
                    "Worker pool saturated"
                );
                Err(SchedulerError::ResourceExhausted {
                    waited_ms: bound.as_millis() as u64,
                })
            }
        }
    }

    /// Stop handing out slots. Pending and future acquires fail with
    /// [`SchedulerError::ShuttingDown`]; permits already held stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Whether [`WorkerPool::close`] was called
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Total number of slots
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of free slots
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of slots currently held by running iterations
    pub fn active_workers(&self) -> usize {
        self.size.saturating_sub(self.available_slots())
    }
}

/// A held worker slot, released on drop.
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}
