//! Breaker-wrapped remote call.
//!
//! A [`Pipeline`] runs one logical call through a circuit breaker, an
//! optional time budget and a retry policy, in that order. The whole logical
//! call, retries included, counts as one breaker sample.

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::ResilienceError;
use crate::listener::StateListener;
use crate::policy::DegradationPolicy;
use crate::retry::{Classify, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Settings shared by every pipeline a registry creates.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    /// Budget for the whole call, retries and backoff included.
    pub call_timeout: Option<Duration>,
    /// Behaviour when the breaker refuses a call.
    pub open_circuit: DegradationPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
            call_timeout: None,
            open_circuit: DegradationPolicy::FailClosed,
        }
    }
}

impl PipelineConfig {
    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_open_circuit(mut self, policy: DegradationPolicy) -> Self {
        self.open_circuit = policy;
        self
    }
}

/// Retry, time budget and breaker for one target.
#[derive(Debug)]
pub struct Pipeline {
    target: String,
    breaker: Option<CircuitBreaker>,
    retry: RetryPolicy,
    call_timeout: Option<Duration>,
    open_circuit: DegradationPolicy,
}

impl Pipeline {
    /// Create a breaker-protected pipeline.
    pub fn new(
        target: impl Into<String>,
        config: PipelineConfig,
        listeners: Vec<Arc<dyn StateListener>>,
    ) -> Self {
        let target = target.into();
        let breaker = CircuitBreaker::with_listeners(target.clone(), config.breaker, listeners);
        Self {
            target,
            breaker: Some(breaker),
            retry: config.retry,
            call_timeout: config.call_timeout,
            open_circuit: config.open_circuit,
        }
    }

    /// Create a pipeline that only retries.
    pub fn retry_only(target: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            target: target.into(),
            breaker: None,
            retry,
            call_timeout: None,
            open_circuit: DegradationPolicy::FailClosed,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Breaker state, `None` for retry-only pipelines.
    pub fn state(&self) -> Option<CircuitState> {
        self.breaker.as_ref().map(CircuitBreaker::state)
    }

    /// Whether a call right now would be refused without reaching the target.
    pub fn is_open(&self) -> bool {
        self.open_circuit == DegradationPolicy::FailClosed
            && self.state() == Some(CircuitState::Open)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `action` with breaker protection, time budget and retries.
    pub async fn execute<F, Fut, T, E>(&self, action: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let Some(breaker) = &self.breaker else {
            return self.run(action).await;
        };

        let permit = match breaker.try_acquire() {
            Some(permit) => permit,
            None => match self.open_circuit {
                DegradationPolicy::FailClosed => {
                    debug!(target_id = %self.target, "Circuit breaker rejected call");
                    return Err(ResilienceError::CircuitOpen {
                        target: self.target.clone(),
                    });
                }
                DegradationPolicy::FailOpen => {
                    warn!(
                        target_id = %self.target,
                        "Circuit breaker open, letting call through (fail-open)"
                    );
                    breaker.bypass_permit()
                }
            },
        };

        let result = self.run(action).await;
        match &result {
            Ok(_) => permit.record_success(),
            Err(_) => permit.record_failure(),
        }
        result
    }

    async fn run<F, Fut, T, E>(&self, action: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let attempts = self.retry.run(&self.target, action);
        match self.call_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, attempts).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(target_id = %self.target, timeout_ms = timeout.as_millis() as u64, "Call exceeded time budget");
                    Err(ResilienceError::Timeout {
                        target: self.target.clone(),
                        timeout,
                    })
                }
            },
            None => attempts.await,
        }
    }
}
