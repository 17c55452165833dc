//! Cache Contract
//!
//! Key-value cache with per-entry TTL used to avoid repeated user lookups.
//! Values are JSON strings so any backend that stores text can implement it.
//! Callers treat a miss and a cache error the same way: fall through to the store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::utils::clock::Clock;
use crate::utils::error::AppResult;

#[async_trait]
pub trait Cache: Send + Sync {
    /// Value for `key`, or `None` when absent or expired
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()>;

    /// Returns whether the key was present
    async fn delete(&self, key: &str) -> AppResult<bool>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local cache whose expiry follows the injected clock
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until they are touched
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict lazily
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        let entry = CacheEntry {
            value,
            expires_at: self.clock.now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::MockClock;

    #[tokio::test]
    async fn test_entries_expire_with_clock() {
        let clock = Arc::new(MockClock::new(Utc::now()));
        let cache = InMemoryCache::new(clock.clone());

        cache
            .set("user:1", "{}".to_string(), Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(cache.get("user:1").await.unwrap().as_deref(), Some("{}"));

        clock.advance(Duration::seconds(60));
        assert!(cache.get("user:1").await.unwrap().is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let cache = InMemoryCache::new(Arc::new(MockClock::new(Utc::now())));
        cache
            .set("k", "v".to_string(), Duration::minutes(5))
            .await
            .unwrap();

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }
}
