//! Transient-error retry helper (spec.md §4.1 failure semantics, §7
//! "transient upstream" taxonomy). The warehouse adapter itself never
//! retries silently — callers decide, matching the teacher's pattern of
//! logging-and-continuing in `alert_engine`/`retention_enforcer` rather than
//! hiding retries inside the client.

use crate::error::WarehouseError;
use std::time::Duration;

/// Default retry budget for the mutating Scd2/fact-ingester call sites that
/// wrap themselves in `with_retry` (spec.md §4.1: recoverable engine errors
/// MUST be retried by the caller).
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Heuristic classification of a warehouse error as transient (connection
/// loss, planner retry, timeout) vs. non-transient (schema mismatch, syntax
/// error). ClickHouse surfaces both as `clickhouse::error::Error`, so the
/// classification is done over the rendered message, matching how other
/// engine-adapter code in this ecosystem inspects transport errors.
pub fn is_transient(err: &WarehouseError) -> bool {
    match err {
        WarehouseError::Transient(_) => true,
        WarehouseError::SchemaMismatch { .. } => false,
        WarehouseError::Query(e) => {
            let msg = e.to_string().to_lowercase();
            msg.contains("connection")
                || msg.contains("timed out")
                || msg.contains("timeout")
                || msg.contains("reset by peer")
                || msg.contains("broken pipe")
                || msg.contains("too many simultaneous queries")
        }
    }
}

/// Retry an async operation up to `max_attempts` times with exponential
/// backoff, but only while the error is classified transient.
pub async fn with_retry<F, Fut, T>(max_attempts: usize, mut op: F) -> Result<T, WarehouseError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, WarehouseError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts && is_transient(&e) => {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt as u32 - 1));
                tracing::warn!("transient warehouse error (attempt {attempt}): {e}, retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
