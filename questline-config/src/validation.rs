//! Settings validation.

use crate::{ConfigError, Result};

/// Checked after every load, before any component is built.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Field-level checks shared by the settings sections.
pub struct ConfigValidator;

fn invalid(field: &str, problem: impl std::fmt::Display) -> ConfigError {
    ConfigError::ValidationError(format!("{field} {problem}"))
}

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(invalid(field, "cannot be empty"));
        }
        Ok(())
    }

    /// Inclusive range check.
    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<()> {
        if value < min || value > max {
            return Err(invalid(
                field,
                format_args!("must be between {min} and {max}, got {value}"),
            ));
        }
        Ok(())
    }

    /// Counts and durations that must be non-zero.
    pub fn positive(value: u64, field: &str) -> Result<()> {
        if value == 0 {
            return Err(invalid(field, "must be greater than zero"));
        }
        Ok(())
    }

    /// Accepts the schemes the layer connects to: HTTP(S) and Redis.
    pub fn is_url(value: &str, field: &str) -> Result<()> {
        let scheme_ok = ["http://", "https://", "redis://", "rediss://"]
            .iter()
            .any(|scheme| value.starts_with(scheme));
        if !scheme_ok {
            return Err(invalid(field, format_args!("must be a valid URL, got {value:?}")));
        }
        Ok(())
    }
}
