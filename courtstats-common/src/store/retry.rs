//! Retry loop for optimistic transactions and lock contention

use super::{Document, DocumentStore, UpdateFn};
use crate::paths::DocPath;
use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Retry an operation with exponential backoff until `max_wait_ms` elapses.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If the error is retryable (write conflict, database locked):
///    a. If time elapsed < max_wait_ms: log WARN, backoff, retry
///    b. If time elapsed >= max_wait_ms: log ERROR, return error
/// 4. Any other error is returned immediately
///
/// **Backoff Strategy:**
/// - Initial delay: 10ms
/// - Max delay: 1000ms
/// - Multiplier: 2.0
pub async fn retry_on_conflict<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if err.is_retryable() => {
                let elapsed = start_time.elapsed();

                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        error = %err,
                        "Giving up: max retry time exceeded"
                    );
                    return Err(Error::Internal(format!(
                        "{} failed after {} attempts ({} ms elapsed, max {} ms): {}",
                        operation_name,
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms,
                        err
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    remaining_ms = max_duration.saturating_sub(elapsed).as_millis() as u64,
                    error = %err,
                    "Retryable failure, backing off"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Run `update` as a read-modify-write transaction, retrying on conflict
pub async fn run_transaction(
    store: &dyn DocumentStore,
    path: &DocPath,
    max_wait_ms: u64,
    update: UpdateFn<'_>,
) -> Result<Document> {
    retry_on_conflict("document transaction", max_wait_ms, || {
        store.read_modify_write(path, update)
    })
    .await
}
