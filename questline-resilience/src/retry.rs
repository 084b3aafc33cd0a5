//! Retry with exponential backoff and jitter.
//!
//! ## Example
//!
//! ```rust
//! use questline_resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new()
//!     .with_max_retries(3)
//!     .with_min_delay(Duration::from_millis(50));
//!
//! assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(50));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
//! ```

use crate::error::ResilienceError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Tells the retry loop whether an error is transient.
pub trait Classify {
    /// Transport failures, timeouts and server errors return `true`.
    fn is_retryable(&self) -> bool;
}

impl Classify for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind::*;
        matches!(
            self.kind(),
            ConnectionRefused
                | ConnectionReset
                | ConnectionAborted
                | NotConnected
                | BrokenPipe
                | TimedOut
                | Interrupted
                | UnexpectedEof
        )
    }
}

/// Retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Growth factor per retry.
    pub factor: f64,
    /// Upper bound for a single delay, jitter included.
    pub max_delay: Duration,
    /// Random extra delay, as a fraction of the computed delay (0.0 - 1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor.max(1.0);
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-indexed), without jitter.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let millis = self.min_delay.as_millis() as f64 * self.factor.powi(exponent);
        let max_millis = self.max_delay.as_millis() as f64;
        Duration::from_millis(millis.min(max_millis) as u64)
    }

    /// Delay before retry number `retry` with jitter applied.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.delay_for_attempt(retry);
        if self.jitter <= 0.0 {
            return base;
        }
        let extra = base.mul_f64(self.jitter * fastrand::f64());
        (base + extra).min(self.max_delay)
    }

    /// Run `action` until it succeeds, fails non-retryably, or attempts run out.
    ///
    /// `target` only labels logs and errors.
    pub async fn run<F, Fut, T, E>(&self, target: &str, mut action: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match action().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(target_id = %target, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    debug!(target_id = %target, attempt, error = %error, "Non-retryable failure");
                    return Err(ResilienceError::NonRetryable {
                        target: target.to_string(),
                        source: error,
                    });
                }
                Err(error) => {
                    if attempt >= self.max_attempts() {
                        warn!(
                            target_id = %target,
                            attempts = attempt,
                            error = %error,
                            "Retries exhausted"
                        );
                        return Err(ResilienceError::RetriesExhausted {
                            target: target.to_string(),
                            attempts: attempt,
                            source: error,
                        });
                    }

                    let delay = self.jittered_delay(attempt - 1);
                    debug!(
                        target_id = %target,
                        attempt,
                        remaining = self.max_attempts() - attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(retryable={})", self.0)
        }
    }

    impl std::error::Error for Flaky {}

    impl Classify for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = RetryPolicy::new()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy::new().with_jitter(0.5);
        for _ in 0..100 {
            let delay = policy.jittered_delay(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_succeed() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ResilienceError<Flaky>> = RetryPolicy::new()
            .run("svc", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 { Err(Flaky(true)) } else { Ok(n) }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::new()
            .run("svc", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(false))
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::NonRetryable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::new()
            .with_max_retries(3)
            .run("svc", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(true))
            })
            .await;

        match result {
            Err(ResilienceError::RetriesExhausted { attempts, target, .. }) => {
                assert_eq!(attempts, 4);
                assert_eq!(target, "svc");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_io_error_classification() {
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(refused.is_retryable());
        assert!(!denied.is_retryable());
    }
}
