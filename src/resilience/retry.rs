//! Retry Wrapper
//!
//! Re-runs an idempotent async operation with a fixed or exponential delay
//! between attempts. The last error is always handed back to the caller.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Upper bound for a single exponential delay.
const MAX_DELAY: Duration = Duration::from_secs(30);

// == Backoff ==
/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Always wait `base_delay`
    Fixed,
    /// Wait `base_delay * 2^attempt`, capped at 30 seconds
    Exponential,
}

// == Retry Policy ==
/// Retry parameters for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` counts the first call; zero is treated as one.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff,
        }
    }

    pub fn fixed(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(max_attempts, base_delay, Backoff::Fixed)
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(max_attempts, base_delay, Backoff::Exponential)
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    // == Delay ==
    /// Delay to wait after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                self.base_delay
                    .checked_mul(factor)
                    .unwrap_or(MAX_DELAY)
                    .min(MAX_DELAY)
            }
        }
    }

    // == Retry ==
    /// Runs `operation` until it succeeds or attempts run out.
    ///
    /// Success returns immediately without any delay. Every error is retried;
    /// after the last attempt the final error is returned unchanged.
    pub async fn retry<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.retry_if(operation, |_| true).await
    }

    /// Like [`RetryPolicy::retry`], but stops at the first error for which
    /// `should_retry` returns false.
    pub async fn retry_if<T, E, F, Fut, P>(&self, mut operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let remaining = self.max_attempts - attempt - 1;
                    if remaining == 0 || !should_retry(&err) {
                        debug!(attempt = attempt + 1, error = %err, "giving up");
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    /// Four attempts with a fixed one second delay.
    fn default() -> Self {
        Self::fixed(4, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(5), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(20), MAX_DELAY);
        assert_eq!(policy.delay_for(64), MAX_DELAY);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_without_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        let start = Instant::now();

        let result: Result<u32, String> = policy.retry(|| async { Ok(7) }).await;

        assert_eq!(result, Ok(7));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::fixed(4, Duration::from_secs(1));
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<&str, String> = policy
            .retry(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("boom".to_string())
                } else {
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_propagates_last_error() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(10));
        let calls = &AtomicU32::new(0);

        let result: Result<(), String> = policy
            .retry(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(format!("failure {}", n))
            })
            .await;

        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_waits_double() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(100));
        let start = Instant::now();

        let result: Result<(), String> = policy.retry(|| async { Err("x".to_string()) }).await;

        assert!(result.is_err());
        // 100ms after the first failure, 200ms after the second
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_if_stops_on_permanent_error() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(1));
        let calls = &AtomicU32::new(0);

        let result: Result<(), String> = policy
            .retry_if(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("permanent".to_string())
                },
                |err| err != "permanent",
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
