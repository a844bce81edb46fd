//! Capacity-bounded pool of execution contexts.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::ResourceError;

/// Identifier of one execution context inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub usize);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Fixed-size set of contexts shared by the workers of one batch.
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct ContextPool {
    capacity: usize,
    permits: Arc<Semaphore>,
    free: Arc<Mutex<Vec<ContextId>>>,
}

impl fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

impl ContextPool {
    /// Creates a pool with `capacity` contexts numbered from zero.
    pub fn new(capacity: usize) -> Self {
        // Popped from the back, so lower ids are handed out first.
        let free = (0..capacity).rev().map(ContextId).collect();
        Self {
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
            free: Arc::new(Mutex::new(free)),
        }
    }

    /// Total number of contexts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of contexts currently not checked out.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free context and checks it out.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::Closed` if the pool was closed.
    pub async fn checkout(&self) -> Result<ContextLease, ResourceError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ResourceError::Closed)?;

        let id = self
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .ok_or(ResourceError::Closed)?;

        Ok(ContextLease {
            id,
            free: Arc::clone(&self.free),
            _permit: permit,
        })
    }

    /// Closes the pool; pending and future checkouts fail.
    pub fn close(&self) {
        self.permits.close();
    }
}

/// A checked-out context. Returned to the pool on drop.
pub struct ContextLease {
    id: ContextId,
    free: Arc<Mutex<Vec<ContextId>>>,
    _permit: OwnedSemaphorePermit,
}

impl ContextLease {
    /// Identifier of the leased context.
    pub fn id(&self) -> ContextId {
        self.id
    }
}

impl fmt::Debug for ContextLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextLease").field("id", &self.id).finish()
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        // The id goes back before the permit is released (field drop order).
        self.free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_checkout_and_return() {
        let pool = ContextPool::new(2);
        assert_eq!(pool.available(), 2);

        let first = pool.checkout().await.unwrap();
        let second = pool.checkout().await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(pool.available(), 0);

        drop(first);
        assert_eq!(pool.available(), 1);

        let third = pool.checkout().await.unwrap();
        assert_eq!(third.id(), ContextId(0));
    }

    #[tokio::test]
    async fn test_checkout_waits_for_free_context() {
        let pool = ContextPool::new(1);
        let lease = pool.checkout().await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(20), pool.checkout()).await;
        assert!(waiting.is_err());

        drop(lease);
        let lease = tokio::time::timeout(Duration::from_millis(20), pool.checkout()).await;
        assert!(lease.is_ok());
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_checkout() {
        let pool = ContextPool::new(1);
        pool.close();
        assert!(matches!(pool.checkout().await, Err(ResourceError::Closed)));
    }

    #[test]
    fn test_context_id_display() {
        assert_eq!(ContextId(3).to_string(), "ctx-3");
    }
}
