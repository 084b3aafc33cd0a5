//! Backend errors.

use questline_resilience::Classify;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Backend failure.
///
/// These never escape [`CacheClient`](crate::CacheClient); they surface in
/// logs and through the [`CacheStore`](crate::CacheStore) trait.
#[derive(Debug, Error)]
pub enum CacheError {
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No live connection to the backend.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Rejected before any connection attempt, e.g. a malformed URL.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Whether the error means the backend connection is gone.
    pub fn is_connection_error(&self) -> bool {
        match self {
            #[cfg(feature = "redis")]
            Self::Redis(e) => e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal(),
            Self::Connection(_) => true,
            Self::Config(_) => false,
        }
    }
}

impl Classify for CacheError {
    fn is_retryable(&self) -> bool {
        match self {
            #[cfg(feature = "redis")]
            Self::Redis(e) => self.is_connection_error() || e.is_timeout(),
            Self::Connection(_) => true,
            Self::Config(_) => false,
        }
    }
}
