//! Rejections, store failures, and the headers that go with them.

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER};
use std::time::Duration;
use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The actor used up its quota
    #[error("Rate limit exceeded for {actor} on {policy}. Retry after {retry_after:?}")]
    LimitExceeded {
        actor: String,
        policy: String,
        /// Points allowed per window
        limit: u64,
        /// Whole seconds until the window or block resets
        retry_after: Duration,
    },

    /// The counter store is unreachable and the limiter fails closed
    #[error("Rate limiting unavailable: {0}")]
    ServiceUnavailable(String),

    /// The user agent looks automated
    #[error("Automated clients are not allowed: {user_agent}")]
    BotRejected { user_agent: String },

    #[error("Rate limit store error: {0}")]
    StoreError(String),

    #[error("Rate limit configuration error: {0}")]
    ConfigError(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}

impl RateLimitError {
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a limit exceeded error, rounding the wait up to whole seconds.
    pub fn limit_exceeded(
        actor: impl Into<String>,
        policy: impl Into<String>,
        limit: u64,
        reset_after: Duration,
    ) -> Self {
        Self::LimitExceeded {
            actor: actor.into(),
            policy: policy.into(),
            limit,
            retry_after: Duration::from_secs(ceil_secs(reset_after)),
        }
    }

    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Whether the error came from the counter store rather than a decision.
    pub fn is_store_failure(&self) -> bool {
        match self {
            Self::StoreError(_) => true,
            #[cfg(feature = "redis")]
            Self::RedisError(_) => true,
            _ => false,
        }
    }

    /// How long a rejected caller should wait.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::LimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// HTTP status a caller should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::LimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BotRejected { .. } => StatusCode::FORBIDDEN,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Headers for a 429 response.
    pub fn headers(&self) -> Option<RateLimitHeaders> {
        match self {
            Self::LimitExceeded {
                limit, retry_after, ..
            } => Some(RateLimitHeaders::denied(*limit, retry_after.as_secs())),
            _ => None,
        }
    }
}

/// Seconds in `duration`, rounded up, never less than one.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

/// Standard rate limit headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// X-RateLimit-Limit: Maximum requests allowed
    pub limit: u64,
    /// X-RateLimit-Remaining: Requests remaining in current window
    pub remaining: u64,
    /// X-RateLimit-Reset: Seconds until the window resets
    pub reset: u64,
    /// Retry-After: Seconds until the client should retry (only when limited)
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    /// Create headers for an allowed request
    pub fn allowed(limit: u64, remaining: u64, reset: u64) -> Self {
        Self {
            limit,
            remaining,
            reset,
            retry_after: None,
        }
    }

    /// Create headers for a denied request
    pub fn denied(limit: u64, retry_after: u64) -> Self {
        Self {
            limit,
            remaining: 0,
            reset: retry_after,
            retry_after: Some(retry_after),
        }
    }

    /// Get header name/value pairs
    pub fn to_header_pairs(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset.to_string()),
        ];

        if let Some(retry) = self.retry_after {
            headers.push(("Retry-After", retry.to_string()));
        }

        headers
    }

    /// Write the headers into a response header map.
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        headers.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from(self.reset),
        );
        if let Some(retry) = self.retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from(retry));
        }
    }
}
