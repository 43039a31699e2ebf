//! Retry logic with exponential backoff
//!
//! Transient failures are retried with exponential backoff and optional jitter.
//! Backoff sleeps are cut short when the caller's cancellation token fires.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::retry::{IsRetryable, retry_with_backoff};
//! use media_dl::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let result = retry_with_backoff(&config, &cancel, |_, _, _| {}, |_attempt| async {
//!     Ok::<_, MyError>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection resets) should return `true`.
/// Permanent failures (bad input, missing source, auth) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        // Everything else means the input is invalid or the resource is gone
        matches!(self, FetchError::NetworkFailure(_))
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// `operation` receives the 1-based attempt number so callers can build fresh
/// per-attempt state. `on_retry` is invoked with the number of the attempt that
/// just failed, the delay before the next one, and the error.
///
/// Returns the successful result, or the last error once retries are exhausted,
/// the error is not retryable, or `cancel` fires during a backoff sleep.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    R: FnMut(u32, Duration, &E),
{
    let mut retries = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation(retries + 1).await {
            Ok(result) => {
                if retries > 0 {
                    tracing::info!(attempts = retries + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && retries < config.max_retries && !cancel.is_cancelled() => {
                retries += 1;

                let wait = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt = retries,
                    max_retries = config.max_retries,
                    delay_ms = wait.as_millis() as u64,
                    "Operation failed, retrying"
                );
                on_retry(retries, wait, &e);

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!(attempt = retries, "Backoff interrupted by cancellation");
                        return Err(e);
                    }
                }

                delay = next_delay(config, delay);
            }
            Err(e) => {
                if e.is_retryable() && !cancel.is_cancelled() {
                    tracing::error!(
                        error = %e,
                        attempts = retries + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else if !e.is_retryable() {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Next backoff delay: `delay * backoff_multiplier`, capped at `max_delay`
///
/// A product too large for a `Duration` saturates at `max_delay`.
pub fn next_delay(config: &RetryConfig, delay: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(delay)
}
