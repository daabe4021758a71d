//! Cache-aside store for identity lookups.
//!
//! A miss never populates the cache by itself: the caller resolves it
//! against the relational store and writes the result back with
//! [`CacheAsideStore::set`]. The cache is never authoritative, so every
//! failure mode here (timeout, backend error, undecodable bytes, entry older
//! than the TTL) degrades to a miss instead of an error.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::traits::{CacheBackend, CacheableEntity};

/// Configuration for the cache-aside store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entries older than this are treated as misses.
    pub entry_ttl: Duration,
    /// Bound on each backend call.
    pub backend_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(60),
            backend_timeout: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the per-call backend timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    degraded: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

/// Snapshot of cache-aside counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheAsideStats {
    pub hits: u64,
    /// Plain misses, including TTL expiry.
    pub misses: u64,
    /// Misses caused by a timeout, backend error or undecodable entry.
    pub degraded: u64,
    pub writes: u64,
    pub write_failures: u64,
}

impl CacheAsideStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.degraded;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache-aside wrapper over a [`CacheBackend`] for one entity type.
pub struct CacheAsideStore<T: CacheableEntity> {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    counters: Arc<Counters>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: CacheableEntity> Clone for CacheAsideStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            counters: Arc::clone(&self.counters),
            _entity: PhantomData,
        }
    }
}

impl<T: CacheableEntity> fmt::Debug for CacheAsideStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheAsideStore")
            .field("prefix", &T::key_prefix())
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T: CacheableEntity> CacheAsideStore<T> {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            counters: Arc::new(Counters::default()),
            _entity: PhantomData,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up an entity. `None` is a miss the caller must resolve against
    /// the source of truth.
    pub async fn get(&self, id: &T::Id) -> Option<T> {
        let key = T::cache_key(id);
        let lookup = tokio::time::timeout(self.config.backend_timeout, self.backend.get(&key)).await;

        let cached = match lookup {
            Ok(Ok(Some(cached))) => cached,
            Ok(Ok(None)) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(_) => {
                tracing::warn!(key = %key, "Cache read timed out, treating as miss");
                self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        // A backend may hold an entry longer than our TTL (e.g. written with a
        // different TTL); age is checked here as well.
        let age = (Utc::now() - cached.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if age >= self.config.entry_ttl {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match serde_json::from_slice::<T>(&cached.value) {
            Ok(entity) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entity)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Undecodable cache entry, treating as miss");
                self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write an entity with the configured TTL. Failures are logged and
    /// swallowed.
    pub async fn set(&self, entity: &T) {
        let key = T::cache_key(&entity.entity_id());
        let value = match serde_json::to_vec(entity) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode cache entry");
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let write = tokio::time::timeout(
            self.config.backend_timeout,
            self.backend.put(&key, value, self.config.entry_ttl),
        )
        .await;
        match write {
            Ok(Ok(())) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "Cache write failed");
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                tracing::warn!(key = %key, "Cache write timed out");
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drop any cached entry for `id`. Called after every write that changes
    /// the entity. Failures are logged; the stale entry then lives at most
    /// one TTL.
    pub async fn invalidate(&self, id: &T::Id) {
        let key = T::cache_key(id);
        match tokio::time::timeout(self.config.backend_timeout, self.backend.delete(&key)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "Cache invalidation failed");
            }
            Err(_) => {
                tracing::warn!(key = %key, "Cache invalidation timed out");
            }
        }
    }

    pub fn stats(&self) -> CacheAsideStats {
        CacheAsideStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            degraded: self.counters.degraded.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }
}
