//! Cache backend trait and cacheable entity marker.

use std::fmt::Display;
use std::time::Duration;

use agora_core::{User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use super::lmdb_backend::LmdbCacheError;

/// Types that can be held in the identity cache.
///
/// The cache key is `"{key_prefix}-{id}"`, e.g. `user-42`.
pub trait CacheableEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: Display + Send + Sync;

    fn key_prefix() -> &'static str;

    fn entity_id(&self) -> Self::Id;

    fn cache_key(id: &Self::Id) -> String {
        format!("{}-{}", Self::key_prefix(), id)
    }
}

impl CacheableEntity for User {
    type Id = UserId;

    fn key_prefix() -> &'static str {
        "user"
    }

    fn entity_id(&self) -> UserId {
        self.id
    }
}

/// Raw cached value and when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBytes {
    pub value: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Lmdb(#[from] LmdbCacheError),
}

/// Key/value cache backend.
///
/// Object safe so the API layer can pick LMDB or in-memory at startup.
/// Backends must never return an entry past its TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedBytes>, CacheError>;

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key. Returns whether it was present.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
    /// Entries dropped because their TTL ran out.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Absolute expiry for an entry written at `now` with `ttl`.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_user_cache_key() {
        assert_eq!(User::cache_key(&42), "user-42");
    }

    #[test]
    fn test_expiry_after_saturates() {
        let now = Utc::now();
        assert_eq!(
            expiry_after(now, Duration::from_secs(60)),
            now + chrono::Duration::seconds(60)
        );
        assert_eq!(expiry_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
