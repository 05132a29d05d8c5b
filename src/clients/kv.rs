//! Shared key-value store used for short-lived markers.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::Result;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    async fn set(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Set the key only when it is absent or expired; `true` when this call set it
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local store with per-entry expiry
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, Instant>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| *e.value() > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(expires_at) if *expires_at > now => return Ok(true),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, expires_at| *expires_at <= now);
        }
        Ok(false)
    }

    async fn set(&self, key: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    Ok(false)
                } else {
                    entry.insert(now + ttl);
                    Ok(true)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now + ttl);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_is_exclusive() {
        let kv = InMemoryKeyValueStore::new();
        assert!(kv.set_if_absent("k", Duration::from_secs(60)).await.unwrap());
        assert!(!kv.set_if_absent("k", Duration::from_secs(60)).await.unwrap());
        assert!(kv.exists("k").await.unwrap());
        kv.delete("k").await.unwrap();
        assert!(!kv.exists("k").await.unwrap());
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entries_can_be_reacquired() {
        let kv = InMemoryKeyValueStore::new();
        kv.set("k", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!kv.exists("k").await.unwrap());
        assert!(kv.set_if_absent("k", Duration::from_secs(60)).await.unwrap());
    }
}
