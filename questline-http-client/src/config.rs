//! HTTP client configuration.

use questline_resilience::{CircuitBreakerConfig, DegradationPolicy, PipelineConfig, RetryPolicy};
use std::time::Duration;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL that relative request URLs are joined to.
    pub base_url: Option<String>,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Breaker, retry and time budget applied per target.
    pub pipeline: PipelineConfig,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Headers sent with every request, before per-request headers.
    pub default_headers: Vec<(String, String)>,
    pub user_agent: String,
    /// Accept gzip and brotli encoded bodies.
    pub compression: bool,
    /// Redirect hops to follow, `None` to return 3xx responses as is.
    pub max_redirects: Option<usize>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            pipeline: PipelineConfig::default(),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            default_headers: Vec::new(),
            user_agent: format!("questline-http-client/{}", env!("CARGO_PKG_VERSION")),
            compression: true,
            max_redirects: Some(10),
        }
    }
}

impl HttpClientConfig {
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for [`HttpClientConfig`].
///
/// ```
/// use questline_http_client::{HttpClientConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let config = HttpClientConfig::builder()
///     .timeout(Duration::from_secs(3))
///     .retry(RetryPolicy::new().with_max_retries(1))
///     .call_timeout(Duration::from_secs(8))
///     .build();
/// assert_eq!(config.pipeline.retry.max_retries, 1);
/// ```
#[derive(Debug, Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Time allowed for one attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Replace breaker, retry, call budget and open-circuit policy at once.
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.config.pipeline = pipeline;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.pipeline.retry = retry;
        self
    }

    pub fn circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.config.pipeline.breaker = breaker;
        self
    }

    /// Bound each logical call, retries included.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.pipeline.call_timeout = Some(timeout);
        self
    }

    /// Behaviour when a target's breaker is open.
    pub fn open_circuit(mut self, policy: DegradationPolicy) -> Self {
        self.config.pipeline.open_circuit = policy;
        self
    }

    /// Connection pool sizing.
    pub fn pool(mut self, idle_timeout: Duration, max_idle_per_host: usize) -> Self {
        self.config.pool_idle_timeout = idle_timeout;
        self.config.pool_max_idle_per_host = max_idle_per_host;
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn compression(mut self, enable: bool) -> Self {
        self.config.compression = enable;
        self
    }

    /// Follow at most `max` redirects; `None` disables following.
    pub fn redirects(mut self, max: Option<usize>) -> Self {
        self.config.max_redirects = max;
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}
