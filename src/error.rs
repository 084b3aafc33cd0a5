use thiserror::Error;

/// Errors raised while assembling the resilience layer.
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Configuration error: {0}")]
    Config(#[from] questline_config::ConfigError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] questline_http_client::HttpClientError),

    #[error("Cache error: {0}")]
    Cache(#[from] questline_cache::CacheError),

    #[error("Rate limiter error: {0}")]
    RateLimit(#[from] questline_ratelimit::RateLimitError),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),
}

pub type Result<T> = std::result::Result<T, LayerError>;
