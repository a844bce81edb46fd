//! Shared execution-context pools.
//!
//! Some compute operations need an exclusive execution context (for example a
//! browser page in an automation cluster). The dispatch engine treats the
//! cluster purely as a resource manager:
//!
//! - **ResourceProvider**: acquires a [`ContextPool`] of fixed capacity for a
//!   batch and releases it when the batch ends
//! - **ContextPool**: hands out one [`ContextLease`] per task attempt; the
//!   lease returns its context to the pool when dropped
//! - **PoolGuard**: owns an acquired pool for the duration of a batch and
//!   releases it back to the provider, even if the batch is cancelled
//!
//! A provider that cannot produce a pool aborts the batch.

pub mod pool;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

pub use pool::{ContextId, ContextLease, ContextPool};

/// Errors that can occur while managing execution contexts.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The provider could not supply contexts.
    #[error("Execution contexts unavailable: {0}")]
    Unavailable(String),

    /// The pool was closed while a checkout was pending.
    #[error("Context pool is closed")]
    Closed,
}

/// Supplier of execution-context pools.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Acquires a pool holding `capacity` contexts.
    async fn acquire(&self, capacity: usize) -> Result<ContextPool, ResourceError>;

    /// Releases a pool previously returned by [`ResourceProvider::acquire`].
    async fn release(&self, pool: ContextPool);
}

/// Acquired pool that is handed back to its provider exactly once.
///
/// Call [`PoolGuard::release`] on the normal path. If the guard is dropped
/// instead (for example because the batch future was cancelled), the pool is
/// closed immediately and the release is spawned on the current runtime.
pub struct PoolGuard {
    provider: Arc<dyn ResourceProvider>,
    pool: Option<ContextPool>,
}

impl PoolGuard {
    /// Acquires a pool of `capacity` contexts from `provider`.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the pool cannot be acquired.
    pub async fn acquire(
        provider: Arc<dyn ResourceProvider>,
        capacity: usize,
    ) -> Result<Self, ResourceError> {
        let pool = provider.acquire(capacity).await?;
        Ok(Self {
            provider,
            pool: Some(pool),
        })
    }

    /// The guarded pool, until it is released.
    pub fn pool(&self) -> Option<&ContextPool> {
        self.pool.as_ref()
    }

    /// Releases the pool back to the provider.
    pub async fn release(mut self) {
        if let Some(pool) = self.pool.take() {
            self.provider.release(pool).await;
        }
    }
}

impl fmt::Debug for PoolGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolGuard").field("pool", &self.pool).finish()
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };

        // Pending checkouts fail fast instead of waiting on a dead batch.
        pool.close();
        let provider = Arc::clone(&self.provider);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(capacity = pool.capacity(), "Releasing context pool of dropped batch");
                handle.spawn(async move { provider.release(pool).await });
            }
            Err(_) => {
                warn!(
                    capacity = pool.capacity(),
                    "No runtime to release context pool, pool closed without release"
                );
            }
        }
    }
}

/// In-process provider whose contexts are plain slots.
///
/// Keeps counters of acquired and released pools so callers can verify that
/// every acquisition is paired with a release.
#[derive(Debug, Default)]
pub struct LocalContextProvider {
    acquired: AtomicU64,
    released: AtomicU64,
}

impl LocalContextProvider {
    /// Creates a new local provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pools handed out so far.
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Number of pools released so far.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceProvider for LocalContextProvider {
    async fn acquire(&self, capacity: usize) -> Result<ContextPool, ResourceError> {
        if capacity == 0 {
            return Err(ResourceError::Unavailable(
                "requested a pool with zero contexts".to_string(),
            ));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(capacity = capacity, "Acquired local context pool");
        Ok(ContextPool::new(capacity))
    }

    async fn release(&self, pool: ContextPool) {
        pool.close();
        self.released.fetch_add(1, Ordering::SeqCst);
        debug!(capacity = pool.capacity(), "Released local context pool");
    }
}
