//! In-process cache backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::traits::{expiry_after, CacheBackend, CacheError, CacheStats, CachedBytes};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// DashMap-backed cache. Expired entries are dropped lazily on read or by
/// [`InMemoryCacheBackend::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<String, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry whose TTL has elapsed. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before.saturating_sub(self.entries.len());
        self.expirations
            .fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CachedBytes>, CacheError> {
        let now = Utc::now();
        let found = self.entries.get(key).map(|entry| entry.clone());
        match found {
            Some(entry) if entry.expires_at > now => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(CachedBytes {
                    value: entry.value,
                    cached_at: entry.cached_at,
                }))
            }
            Some(_) => {
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.expires_at <= now)
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let now = Utc::now();
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                cached_at: now,
                expires_at: expiry_after(now, ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let backend = InMemoryCacheBackend::new();
        backend
            .put("user-1", b"{}".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let cached = backend.get("user-1").await.unwrap().unwrap();
        assert_eq!(cached.value, b"{}".to_vec());
        assert!(backend.delete("user-1").await.unwrap());
        assert!(!backend.delete("user-1").await.unwrap());
        assert!(backend.get("user-1").await.unwrap().is_none());

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let backend = InMemoryCacheBackend::new();
        backend
            .put("user-1", b"{}".to_vec(), Duration::ZERO)
            .await
            .unwrap();

        assert!(backend.get("user-1").await.unwrap().is_none());
        assert!(backend.is_empty());
        assert_eq!(backend.stats().await.unwrap().expirations, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = InMemoryCacheBackend::new();
        backend
            .put("a", vec![1], Duration::ZERO)
            .await
            .unwrap();
        backend
            .put("b", vec![2], Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
    }
}
