//! Cache configuration types.

use questline_resilience::{CircuitBreakerConfig, PipelineConfig, RetryPolicy};
use std::time::Duration;

/// Name of the cache backend when none is given.
pub const DEFAULT_TARGET: &str = "primary";

/// Cache client configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Key prefix for all cache keys
    pub key_prefix: Option<String>,

    /// Backend name, registered as `cache:{target}`
    pub target: String,

    /// Breaker, retry and time budget for backend operations
    pub pipeline: PipelineConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: None,
            target: DEFAULT_TARGET.to_string(),
            pipeline: PipelineConfig::default()
                .with_retry(
                    RetryPolicy::new()
                        .with_max_retries(1)
                        .with_min_delay(Duration::from_millis(50)),
                )
                .with_call_timeout(Duration::from_secs(3)),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Name this backend, e.g. to give a second cache its own breaker.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Breaker target identity, kept apart from service and origin targets.
    pub fn target_id(&self) -> String {
        format!("cache:{}", self.target)
    }

    /// Set the retry policy for backend operations.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.pipeline.retry = retry;
        self
    }

    /// Set the breaker configuration.
    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.pipeline.breaker = breaker;
        self
    }

    /// Set the per-operation time budget, retries included.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline.call_timeout = Some(timeout);
        self
    }

    /// Build the final key with prefix if configured.
    pub fn build_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

/// How the Redis backend establishes and watches its connection.
#[derive(Debug, Clone)]
pub struct RedisConnectConfig {
    /// Connection URL
    pub url: String,

    /// Attempts made at startup before giving up
    pub connect_attempts: u32,

    /// Backoff between startup attempts
    pub backoff: RetryPolicy,

    /// Timeout for a single connection attempt
    pub connection_timeout: Duration,

    /// How often a disconnected backend is probed, `None` to never probe
    pub health_check_interval: Option<Duration>,
}

impl RedisConnectConfig {
    /// Create a Redis connection configuration.
    ///
    /// ```
    /// use questline_cache::RedisConnectConfig;
    ///
    /// let config = RedisConnectConfig::new("redis://localhost:6379").with_connect_attempts(3);
    /// assert_eq!(config.connect_attempts, 3);
    /// ```
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_attempts: 5,
            backoff: RetryPolicy::new()
                .with_min_delay(Duration::from_millis(200))
                .with_max_delay(Duration::from_secs(5)),
            connection_timeout: Duration::from_secs(5),
            health_check_interval: Some(Duration::from_secs(5)),
        }
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Option<Duration>) -> Self {
        self.health_check_interval = interval;
        self
    }
}
