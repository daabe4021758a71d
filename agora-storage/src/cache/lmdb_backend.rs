//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store for cached identity snapshots that survives restarts.
//!
//! # Value Layout
//!
//! `[cached_at millis: i64 BE][expires_at millis: i64 BE][json value]`
//!
//! Expiry is stored with the value so a reopened environment still refuses
//! entries whose TTL ran out while the process was down.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::traits::{expiry_after, CacheBackend, CacheError, CacheStats, CachedBytes};

const HEADER_LEN: usize = 16;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes are too short or carry an invalid timestamp.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache.
///
/// heed transactions are synchronous and a write waits on the environment's
/// writer lock, so every operation runs on the blocking pool. The caller's
/// timeout can then abandon a stalled call without pinning a runtime worker.
#[derive(Clone)]
pub struct LmdbCacheBackend {
    inner: Arc<LmdbInner>,
}

struct LmdbInner {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: RwLock<CacheStats>,
}

impl LmdbCacheBackend {
    /// Open (or create) a cache environment at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            inner: Arc::new(LmdbInner {
                env,
                db,
                stats: RwLock::new(CacheStats::default()),
            }),
        })
    }

    fn encode(value: &[u8], cached_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + value.len());
        bytes.extend_from_slice(&cached_at.timestamp_millis().to_be_bytes());
        bytes.extend_from_slice(&expires_at.timestamp_millis().to_be_bytes());
        bytes.extend_from_slice(value);
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<(DateTime<Utc>, DateTime<Utc>, &[u8]), LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Corrupt(format!(
                "entry is {} bytes, header needs {}",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let millis = |range: std::ops::Range<usize>| -> Result<DateTime<Utc>, LmdbCacheError> {
            let raw: [u8; 8] = bytes[range]
                .try_into()
                .map_err(|_| LmdbCacheError::Corrupt("invalid timestamp".into()))?;
            DateTime::from_timestamp_millis(i64::from_be_bytes(raw))
                .ok_or_else(|| LmdbCacheError::Corrupt("timestamp out of range".into()))
        };
        Ok((millis(0..8)?, millis(8..16)?, &bytes[HEADER_LEN..]))
    }

    /// Run `op` against the environment on the blocking pool.
    async fn blocking<R, F>(&self, op: F) -> Result<R, CacheError>
    where
        R: Send + 'static,
        F: FnOnce(&LmdbInner) -> Result<R, LmdbCacheError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| CacheError::Unavailable(format!("LMDB task failed: {}", e)))?
            .map_err(CacheError::from)
    }
}

impl LmdbInner {
    fn record_hit(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.hits += 1;
        }
    }

    fn record_miss(&self, expired: bool) {
        if let Ok(mut stats) = self.stats.write() {
            stats.misses += 1;
            if expired {
                stats.expirations += 1;
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<CachedBytes>, LmdbCacheError> {
        let now = Utc::now();
        let found = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            match self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
                Some(bytes) => {
                    let (cached_at, expires_at, value) = LmdbCacheBackend::decode(bytes)?;
                    Some((cached_at, expires_at, value.to_vec()))
                }
                None => None,
            }
        };

        match found {
            Some((cached_at, expires_at, value)) if expires_at > now => {
                self.record_hit();
                Ok(Some(CachedBytes { value, cached_at }))
            }
            Some(_) => {
                self.record_miss(true);
                // Expired: reclaim the slot now rather than waiting for an overwrite.
                if let Err(e) = self.delete(key) {
                    tracing::debug!(key, error = %e, "Failed to drop expired cache entry");
                }
                Ok(None)
            }
            None => {
                self.record_miss(false);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db.put(&mut wtxn, key.as_bytes(), bytes).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)
    }

    fn delete(&self, key: &str) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    fn stats(&self) -> Result<CacheStats, LmdbCacheError> {
        let entry_count = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            self.db.len(&rtxn).map_err(txn_err)?
        };
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        stats.entry_count = entry_count;
        Ok(stats)
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CachedBytes>, CacheError> {
        let key = key.to_string();
        self.blocking(move |inner| inner.get(&key)).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let now = Utc::now();
        let bytes = Self::encode(&value, now, expiry_after(now, ttl));
        let key = key.to_string();
        self.blocking(move |inner| inner.put(&key, &bytes)).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let key = key.to_string();
        self.blocking(move |inner| inner.delete(&key)).await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.blocking(|inner| inner.stats()).await
    }
}
