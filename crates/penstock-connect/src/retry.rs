//! Bounded retry with exponential backoff
//!
//! Applied only at idempotent I/O boundaries (checkpoint commits, file
//! promotion). Row-level and configuration errors are never retried; an
//! error must report itself retryable through
//! [`SyncError::is_retryable`](crate::error::SyncError::is_retryable)
//! to earn another attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles the delay each retry)
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0) spreading delays around the backoff curve
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Create a retry config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a retry config with no retries (fail immediately)
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Create a retry config with fixed delay (no exponential backoff)
    pub fn fixed_delay(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Set max retries (builder pattern)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set initial delay (builder pattern)
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set jitter factor (builder pattern)
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Calculate delay before the given attempt (1-indexed; 0 is the
    /// initial attempt and has no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // cap the exponent so a large attempt count cannot overflow
        let capped = attempt.min(30);
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(capped as i32 - 1);
        let capped_delay = base.min(self.max_delay.as_millis() as f64);

        // deterministic jitter keyed on the attempt number
        let jitter = if self.jitter_factor > 0.0 {
            let swing = capped_delay * self.jitter_factor;
            let phase = (attempt as f64 * 0.618033988749895) % 1.0;
            swing * (phase - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((capped_delay + jitter).max(0.0) as u64)
    }
}

/// Execute an async operation, retrying retryable failures with backoff.
///
/// The operation runs once plus at most `max_retries` more times; the
/// first non-retryable error or exhausted budget returns the error as-is.
pub async fn retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if !error.is_retryable() || attempt > config.max_retries {
                    return Err(error);
                }
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after storage error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> SyncError {
        SyncError::storage_retryable(
            "flaky disk",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"),
        )
    }

    #[test]
    fn test_delay_calculation_exponential() {
        let config = RetryConfig::new().with_jitter(0.0);
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 10.0,
            jitter_factor: 0.0,
            ..Default::default()
        };
        assert!(config.delay_for_attempt(4) <= Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_delay_config() {
        let config = RetryConfig::fixed_delay(5, Duration::from_millis(50));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(50));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let config = RetryConfig::new()
            .with_max_retries(3)
            .with_initial_delay(Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = retry(&config, move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_returns_last_error() {
        let config = RetryConfig::new()
            .with_max_retries(2)
            .with_initial_delay(Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<()> = retry(&config, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let config = RetryConfig::new().with_max_retries(5);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<()> = retry(&config, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::config("bad config")) }
        })
        .await;

        assert!(matches!(result.unwrap_err(), SyncError::Configuration(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
