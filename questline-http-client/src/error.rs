//! HTTP client error types.

use crate::Response;
use questline_resilience::{Classify, ResilienceError};
use std::time::Duration;
use thiserror::Error;

/// Result type for HTTP client operations.
pub type Result<T> = std::result::Result<T, HttpClientError>;

/// Failure of a single attempt.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Connection, TLS, or protocol failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The attempt did not finish within the request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The target answered with a 5xx status.
    #[error("server error: {}", .0.status())]
    ServerError(Box<Response>),
}

impl RequestError {
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(error)
        }
    }

    /// The 5xx response, when that is what failed.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::ServerError(response) => Some(response),
            _ => None,
        }
    }
}

impl Classify for RequestError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => !e.is_builder() && !e.is_redirect(),
            Self::Timeout(_) | Self::ServerError(_) => true,
        }
    }
}

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The target's circuit breaker is open; nothing was sent.
    #[error("Circuit breaker is open for {target}, request rejected")]
    CircuitOpen { target: String },

    /// Every attempt failed with a transport error, timeout or 5xx.
    #[error("Request to {target} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        target: String,
        attempts: u32,
        #[source]
        source: RequestError,
    },

    /// The attempt failed in a way retrying cannot fix.
    #[error("Request to {target} failed: {source}")]
    Request {
        target: String,
        #[source]
        source: RequestError,
    },

    /// The logical call exceeded its time budget.
    #[error("Request to {target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Service name missing from the registry.
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// Request building error.
    #[error("Failed to build request: {0}")]
    RequestBuild(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<ResilienceError<RequestError>> for HttpClientError {
    fn from(error: ResilienceError<RequestError>) -> Self {
        match error {
            ResilienceError::CircuitOpen { target } => Self::CircuitOpen { target },
            ResilienceError::RetriesExhausted {
                target,
                attempts,
                source,
            } => Self::RetriesExhausted {
                target,
                attempts,
                source,
            },
            ResilienceError::NonRetryable { target, source } => Self::Request { target, source },
            ResilienceError::Timeout { target, timeout } => Self::Timeout { target, timeout },
        }
    }
}

impl HttpClientError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RetriesExhausted { source, .. } | Self::Request { source, .. } => {
                source.is_retryable()
            }
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::RetriesExhausted { source, .. } | Self::Request { source, .. } => {
                matches!(source, RequestError::Timeout(_))
            }
            _ => false,
        }
    }

    /// Target identity, when the call reached the resilience layer.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::CircuitOpen { target }
            | Self::RetriesExhausted { target, .. }
            | Self::Request { target, .. }
            | Self::Timeout { target, .. } => Some(target),
            _ => None,
        }
    }

    /// The last 5xx response, if the call ended with one.
    pub fn last_response(&self) -> Option<&Response> {
        match self {
            Self::RetriesExhausted { source, .. } | Self::Request { source, .. } => {
                source.response()
            }
            _ => None,
        }
    }

    /// Get the HTTP status code of the last response, if any.
    pub fn status_code(&self) -> Option<u16> {
        self.last_response().map(|r| r.status().as_u16())
    }

    /// Status a caller would typically answer its own client with.
    pub fn suggested_status(&self) -> u16 {
        match self {
            Self::CircuitOpen { .. } => 503,
            Self::Timeout { .. } => 504,
            Self::RetriesExhausted { source, .. } | Self::Request { source, .. } => match source {
                RequestError::Timeout(_) => 504,
                _ => 502,
            },
            Self::Json(_) => 502,
            Self::InvalidUrl(_) | Self::UnknownService(_) | Self::RequestBuild(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resilience_error_mapping() {
        let open: HttpClientError = ResilienceError::<RequestError>::CircuitOpen {
            target: "https://a.example".to_string(),
        }
        .into();
        assert!(open.is_circuit_open());
        assert_eq!(open.target(), Some("https://a.example"));
        assert_eq!(open.suggested_status(), 503);

        let timed_out: HttpClientError = ResilienceError::<RequestError>::RetriesExhausted {
            target: "svc".to_string(),
            attempts: 3,
            source: RequestError::Timeout(Duration::from_secs(1)),
        }
        .into();
        assert!(timed_out.is_timeout());
        assert!(timed_out.is_retryable());
        assert_eq!(timed_out.suggested_status(), 504);
        assert!(timed_out.last_response().is_none());
    }

    #[test]
    fn test_local_errors() {
        let err = HttpClientError::UnknownService("billing".into());
        assert!(!err.is_retryable());
        assert_eq!(err.target(), None);
        assert_eq!(err.suggested_status(), 500);
        assert_eq!(err.to_string(), "Unknown service: billing");
    }
}
