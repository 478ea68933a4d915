//! Retry utilities: conflict-restart backoff and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter. Only stale-revision
//! conflicts are ever retried, and only when the caller opted in.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::config::ConflictConfig;
use crate::error::CatalogError;

/// Backoff for restarting a read-modify-write cycle after a conflict.
///
/// - Min delay: `conflict.min_delay_ms`
/// - Max delay: `conflict.max_delay_ms`
/// - Max attempts: `conflict.max_restarts`
/// - Jitter enabled
pub fn conflict_backoff(config: &ConflictConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_max_times(config.max_restarts)
        .with_jitter()
}

/// Determines if an error warrants restarting the whole cycle.
///
/// Retryable:
/// - `Conflict`: another writer moved the revision since our read
///
/// Non-retryable: everything else, including `NotFound` and
/// `ValidationFailed`, which will not change by trying again.
pub fn is_restartable(error: &CatalogError) -> bool {
    error.is_retryable()
}
