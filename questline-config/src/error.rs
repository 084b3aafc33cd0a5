//! Settings errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A settings file could not be read or has an unknown format.
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// A file or environment value is malformed.
    #[error("Failed to parse settings: {0}")]
    ParseError(String),

    /// Values parsed but are out of range or inconsistent.
    #[error("Invalid settings: {0}")]
    ValidationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(#[from] std::env::VarError),
}

impl ConfigError {
    /// Error for an environment value that does not parse as the expected type.
    pub fn invalid_value(key: &str, value: &str, expected: &str) -> Self {
        Self::ParseError(format!("{key}={value:?} is not a valid {expected}"))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
