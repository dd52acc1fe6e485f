//! Bounded execution pool for generation work.
//!
//! A fair (FIFO) semaphore caps concurrent generations; a second bound caps
//! how many requests may wait for a permit before new ones are turned away.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Execution pool overloaded: {waiting} waiting (max {max})")]
    Overloaded { waiting: usize, max: usize },

    #[error("Execution pool closed")]
    Closed,
}

/// Pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Generations allowed to run at once.
    pub max_concurrent: usize,
    /// Requests allowed to wait for a permit.
    pub max_pending: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: num_cpus::get().max(1),
            max_pending: 64,
        }
    }
}

struct PoolInner {
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
}

/// Shared handle to the pool. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionPool {
    inner: Arc<PoolInner>,
}

impl ExecutionPool {
    pub fn new(config: PoolConfig) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(permits)),
                waiting: AtomicUsize::new(0),
                config,
            }),
        }
    }

    /// Wait for a permit in arrival order. Fails fast when the waiting line
    /// is already full. Dropping the future leaves the line.
    pub async fn acquire(&self) -> Result<ExecutionPermit, PoolError> {
        let inner = &self.inner;
        match inner.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(ExecutionPermit { _permit: permit }),
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => {}
        }

        let prev = inner.waiting.fetch_add(1, Ordering::SeqCst);
        let _waiting = WaitingGuard { inner: self.inner.clone() };
        if prev >= inner.config.max_pending {
            return Err(PoolError::Overloaded {
                waiting: prev,
                max: inner.config.max_pending,
            });
        }

        let permit = inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(ExecutionPermit { _permit: permit })
    }

    /// Stop handing out permits. Waiters fail with [`PoolError::Closed`].
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Requests currently waiting for a permit.
    pub fn waiting(&self) -> usize {
        self.inner.waiting.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

/// RAII permit. Moves into the worker and frees the slot when dropped.
#[derive(Debug)]
pub struct ExecutionPermit {
    _permit: OwnedSemaphorePermit,
}

struct WaitingGuard {
    inner: Arc<PoolInner>,
}

impl Drop for WaitingGuard {
    fn drop(&mut self) {
        self.inner.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}
