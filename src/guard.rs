//! # Idempotency Guard
//!
//! Per-order mutual exclusion across requests and processes, backed by the shared
//! [`KeyValueStore`]. A marker `"<prefix>:<order id>"` is set with a bounded expiry before
//! an order is mutated; a second caller for the same order gets a `Conflict` until the
//! marker is released or expires.
//!
//! [`OrderLock::release`] removes the marker explicitly. Dropping an unreleased lock
//! spawns the removal on the current runtime, so early returns and `?` still release it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clients::KeyValueStore;
use crate::constants::messages;
use crate::error::{Result, SampleError};

#[derive(Clone)]
pub struct IdempotencyGuard {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
    ttl: Duration,
}

impl std::fmt::Debug for IdempotencyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyGuard")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl IdempotencyGuard {
    pub fn new(kv: Arc<dyn KeyValueStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
            ttl,
        }
    }

    pub fn key_for(&self, oms_order_id: &str) -> String {
        format!("{}:{}", self.prefix, oms_order_id)
    }

    /// Take the order's marker or fail with `Conflict`
    pub async fn acquire(&self, oms_order_id: &str) -> Result<OrderLock> {
        let key = self.key_for(oms_order_id);
        if !self.kv.set_if_absent(&key, self.ttl).await? {
            debug!(order_id = %oms_order_id, "Order is already being processed");
            return Err(SampleError::conflict(messages::RECEIVE_IN_PROGRESS));
        }
        debug!(order_id = %oms_order_id, ttl_secs = self.ttl.as_secs(), "Acquired order lock");
        Ok(OrderLock {
            kv: self.kv.clone(),
            key,
            released: false,
        })
    }
}

/// Held marker for one order
#[must_use = "dropping the lock releases it immediately"]
pub struct OrderLock {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    released: bool,
}

impl std::fmt::Debug for OrderLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLock")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl OrderLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.kv.delete(&self.key).await
    }
}

impl Drop for OrderLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let kv = self.kv.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = kv.delete(&key).await {
                        warn!(key = %key, error = %e, "Failed to release order lock");
                    }
                });
            }
            Err(_) => warn!(key = %key, "No runtime to release order lock; it will expire"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::InMemoryKeyValueStore;

    fn guard(kv: Arc<InMemoryKeyValueStore>) -> IdempotencyGuard {
        IdempotencyGuard::new(kv, "receive_and_sync", Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_second_acquire_conflicts_until_release() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let guard = guard(kv.clone());

        let lock = guard.acquire("O1").await.unwrap();
        assert_eq!(lock.key(), "receive_and_sync:O1");
        let err = guard.acquire("O1").await.unwrap_err();
        assert_eq!(err, SampleError::conflict(messages::RECEIVE_IN_PROGRESS));

        let other = guard.acquire("O2").await.unwrap();
        lock.release().await.unwrap();
        other.release().await.unwrap();
        assert!(kv.is_empty());
        assert!(guard.acquire("O1").await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_releases_marker() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let guard = guard(kv.clone());
        {
            let _lock = guard.acquire("O1").await.unwrap();
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!kv.exists("receive_and_sync:O1").await.unwrap());
    }
}
