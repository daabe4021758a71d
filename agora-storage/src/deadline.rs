//! Deadlines for store calls.

use agora_core::{StorageError, StorageResult};
use std::future::Future;
use std::time::Duration;

/// Default bound on a single store or cache call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a store future under a deadline.
///
/// On expiry the inner future is dropped, which aborts the in-flight
/// operation, and `StorageError::Timeout` is returned.
pub async fn with_deadline<T, F>(operation: &str, timeout: Duration, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "Store call timed out");
            Err(StorageError::Timeout {
                operation: operation.to_string(),
            })
        }
    }
}
