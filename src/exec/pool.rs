// src/exec/pool.rs

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::trace;

/// Bounds how many task attempts execute at once, across every run sharing
/// the pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

/// The pool was closed while waiting for a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a permit, then build and drive the future `make` returns.
    ///
    /// The future is created only once the permit is held, so any timer it
    /// starts does not count time spent queueing.
    pub async fn run<F, Fut>(&self, make: F) -> Result<Fut::Output, PoolClosed>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _permit = self.permits.acquire().await.map_err(|_| PoolClosed)?;
        trace!(available = self.permits.available_permits(), "worker permit acquired");
        Ok(make().await)
    }

    pub fn close(&self) {
        self.permits.close();
    }
}
