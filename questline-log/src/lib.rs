//! Questline Logging
//!
//! Installs the `tracing` subscriber used by every Questline crate, configured
//! from `QUESTLINE_*` environment variables.
//!
//! # Usage
//!
//! ```rust,no_run
//! questline_log::init();
//! tracing::info!(port = 8080, "server started");
//! ```
//!
//! # Environment Variables
//!
//! - `QUESTLINE_DEBUG=1` - Enable debug logging
//! - `QUESTLINE_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `QUESTLINE_LOG_FORMAT=json|pretty|compact` - Set output format
//! - `QUESTLINE_LOG_TIMESTAMPS=1|0` - Include timestamps
//!
//! `RUST_LOG`, when set, takes precedence over the level above until
//! [`set_level`] replaces the filter at runtime.

use once_cell::sync::{Lazy, OnceCell};
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing_subscriber::{EnvFilter, Registry, reload};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Off = 5,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_directive())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line, for local development
    Pretty,
    Compact,
    /// One JSON object per line, the production default
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Global Configuration
// ============================================================================

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static INSTALLED: AtomicBool = AtomicBool::new(false);

static FILTER: OnceCell<reload::Handle<EnvFilter, Registry>> = OnceCell::new();

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Lowers the default level to `debug`
    pub debug: bool,
    pub level: Level,
    pub format: Format,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            timestamps: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl LogConfig {
    /// Read `QUESTLINE_*` variables, falling back to the defaults.
    pub fn from_env() -> Self {
        let debug = env_flag("QUESTLINE_DEBUG").unwrap_or(false);

        let level = env::var("QUESTLINE_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = env::var("QUESTLINE_LOG_FORMAT")
            .ok()
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let timestamps = env_flag("QUESTLINE_LOG_TIMESTAMPS").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            timestamps,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Another global subscriber was installed first.
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct InitError(String);

/// The installed filter could not be replaced.
#[derive(Debug, thiserror::Error)]
#[error("failed to reload log filter: {0}")]
pub struct ReloadError(String);

/// Install the global subscriber from the environment.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() {
    let _ = try_init_with(config());
}

/// Install the global subscriber from the environment, reporting failures.
pub fn try_init() -> Result<(), InitError> {
    try_init_with(config())
}

/// Install the global subscriber from an explicit config.
pub fn try_init_with(config: &LogConfig) -> Result<(), InitError> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));
    let (filter, handle) = reload::Layer::new(filter);

    let registry = tracing_subscriber::registry().with(filter);

    let result = match (config.format, config.timestamps) {
        (Format::Json, true) => registry.with(fmt::layer().json()).try_init(),
        (Format::Json, false) => registry
            .with(fmt::layer().json().without_time())
            .try_init(),
        (Format::Pretty, true) => registry.with(fmt::layer().pretty()).try_init(),
        (Format::Pretty, false) => registry
            .with(fmt::layer().pretty().without_time())
            .try_init(),
        (Format::Compact, true) => registry.with(fmt::layer().compact()).try_init(),
        (Format::Compact, false) => registry
            .with(fmt::layer().compact().without_time())
            .try_init(),
    };

    match result {
        Ok(()) => {
            LOG_LEVEL.store(config.level as u8, Ordering::SeqCst);
            let _ = FILTER.set(handle);
            Ok(())
        }
        Err(e) => {
            INSTALLED.store(false, Ordering::SeqCst);
            Err(InitError(e.to_string()))
        }
    }
}

/// Level of the installed filter, as last set by [`try_init_with`] or
/// [`set_level`].
pub fn current_level() -> Level {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => Level::Trace,
        1 => Level::Debug,
        2 => Level::Info,
        3 => Level::Warn,
        4 => Level::Error,
        _ => Level::Off,
    }
}

/// Replace the installed filter with one at `level`.
///
/// Before a subscriber is installed this only records the level.
pub fn set_level(level: Level) -> Result<(), ReloadError> {
    if let Some(handle) = FILTER.get() {
        handle
            .reload(EnvFilter::new(level.as_directive()))
            .map_err(|e| ReloadError(e.to_string()))?;
    }
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    tracing::debug!(%level, "Log level changed");
    Ok(())
}

/// Lower the level to `debug`, or restore the configured level.
pub fn set_debug(enabled: bool) -> Result<(), ReloadError> {
    if enabled {
        set_level(current_level().min(Level::Debug))
    } else {
        set_level(config().level)
    }
}

/// Configuration read from the environment on first use.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

// ============================================================================
// Tests
// ============================================================================
