//! Configuration for the Questline resilience layer.
//!
//! Settings are layered: built-in defaults, then an optional JSON or TOML
//! file, then `.env`, then `QUESTLINE_*` environment variables.
//!
//! ```rust,no_run
//! use questline_config::{Settings, SettingsLoader};
//!
//! let settings = SettingsLoader::new()
//!     .with_file("questline.toml")
//!     .load()?;
//! assert!(settings.http.timeout_ms > 0);
//! # Ok::<(), questline_config::ConfigError>(())
//! ```

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{
    BreakerSettings, CacheSettings, ENV_PREFIX, FailureMode, HttpSettings, RateLimitSettings,
    RetrySettings, RouteLimitSettings, Settings, SettingsLoader,
};
pub use validation::{ConfigValidator, Validate};
