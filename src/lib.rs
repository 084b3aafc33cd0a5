// Questline - resilience layer for the Questline backend
//
// Outbound calls go through per-target circuit breakers with retries, the
// cache degrades to misses instead of failing requests, and inbound traffic
// is admitted by a distributed rate limiter.

mod error;
mod health;
mod layer;

pub use error::{LayerError, Result};
pub use health::{HealthReport, RateLimitHealth};
pub use layer::ResilienceLayer;

// Re-export the member crates
pub use questline_cache;
pub use questline_config;
pub use questline_http_client;
pub use questline_log;
pub use questline_ratelimit;
pub use questline_resilience;

// Prelude for common imports
pub mod prelude {
    pub use crate::{HealthReport, LayerError, ResilienceLayer};

    pub use questline_cache::{CacheClient, CacheConfig, CacheHealth, InMemoryCache};
    pub use questline_config::{FailureMode, Settings, SettingsLoader};
    pub use questline_http_client::{
        HttpClient, HttpClientConfig, HttpClientError, Response, ServiceRegistry,
    };
    pub use questline_ratelimit::{
        Admission, RateLimitError, RateLimitGuard, RateLimitPolicy, RateLimiter, RequestInfo,
    };
    pub use questline_resilience::{
        CircuitBreakerConfig, CircuitState, DegradationPolicy, PipelineConfig, PipelineRegistry,
        RetryPolicy,
    };
}
