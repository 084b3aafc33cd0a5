//! Typed settings for every part of the resilience layer.

use crate::env::{EnvLoader, parse_value};
use crate::loader::ConfigLoader;
use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "QUESTLINE";

/// Behaviour when a protected dependency is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    FailOpen,
    FailClosed,
}

impl std::str::FromStr for FailureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail-open" | "fail_open" | "open" => Ok(FailureMode::FailOpen),
            "fail-closed" | "fail_closed" | "closed" => Ok(FailureMode::FailClosed),
            other => Err(ConfigError::invalid_value(
                "failure mode",
                other,
                "fail-open|fail-closed",
            )),
        }
    }
}

/// Root settings object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Deployment environment name. Rate limiting is only enforced in
    /// `production` unless configured otherwise.
    pub environment: String,
    pub http: HttpSettings,
    pub retry: RetrySettings,
    pub breaker: BreakerSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    /// Logical service name to base URL.
    pub services: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            http: HttpSettings::default(),
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
            cache: CacheSettings::default(),
            rate_limit: RateLimitSettings::default(),
            services: BTreeMap::new(),
        }
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_ms: u64,
    pub user_agent: Option<String>,
    pub base_url: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: None,
            base_url: None,
        }
    }
}

/// Retry policy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub min_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay_ms: 100,
            factor: 2.0,
            max_delay_ms: 10_000,
            jitter: 0.5,
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Failure percentage that trips the breaker (strictly exceeded).
    pub failure_threshold: f64,
    pub minimum_calls: u32,
    pub reset_timeout_ms: u64,
    pub window_ms: u64,
    pub window_buckets: u32,
    pub half_open_max_calls: u32,
    pub success_threshold: u32,
    pub call_timeout_ms: Option<u64>,
    pub open_circuit: FailureMode,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 50.0,
            minimum_calls: 5,
            reset_timeout_ms: 30_000,
            window_ms: 10_000,
            window_buckets: 10,
            half_open_max_calls: 1,
            success_threshold: 1,
            call_timeout_ms: None,
            open_circuit: FailureMode::FailClosed,
        }
    }
}

/// Cache backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Redis URL; the in-memory backend is used when unset.
    pub url: Option<String>,
    pub key_prefix: String,
    pub connect_attempts: u32,
    pub connect_base_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: "questline".to_string(),
            connect_attempts: 5,
            connect_base_delay_ms: 200,
            max_retries: 1,
        }
    }
}

/// A named quota bound to a path prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLimitSettings {
    pub prefix: String,
    pub name: String,
    pub points: u32,
    pub duration_secs: u64,
    #[serde(default)]
    pub block_duration_secs: u64,
}

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Redis URL; the in-process store is used when unset.
    pub store_url: Option<String>,
    pub key_prefix: String,
    pub points: u32,
    pub duration_secs: u64,
    pub block_duration_secs: u64,
    pub burst_points: u32,
    pub burst_duration_secs: u64,
    pub on_store_failure: FailureMode,
    pub exempt_prefixes: Vec<String>,
    pub bot_patterns: Vec<String>,
    pub enforce_in_non_production: bool,
    /// Per-prefix policies. When empty, the global quota applies to every path.
    pub routes: Vec<RouteLimitSettings>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            store_url: None,
            key_prefix: "ratelimit".to_string(),
            points: 100,
            duration_secs: 900,
            block_duration_secs: 0,
            burst_points: 10,
            burst_duration_secs: 1,
            on_store_failure: FailureMode::FailOpen,
            exempt_prefixes: vec!["/api/auth".to_string()],
            bot_patterns: ["bot", "crawler", "spider", "scraper", "headless"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            enforce_in_non_production: false,
            routes: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, `.env`, and `QUESTLINE_*` variables.
    pub fn from_env() -> Result<Self> {
        SettingsLoader::new().load()
    }

    /// Whether the environment is production.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Apply overrides from prefix-stripped, lowercased variables.
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        for (key, raw) in vars {
            let value = raw.as_str();
            match key.as_str() {
                "env" | "environment" => self.environment = value.trim().to_string(),

                "http_timeout_ms" => self.http.timeout_ms = parse_value(key, value)?,
                "http_user_agent" => self.http.user_agent = Some(value.to_string()),
                "http_base_url" => self.http.base_url = Some(value.to_string()),

                "retry_max_retries" => self.retry.max_retries = parse_value(key, value)?,
                "retry_min_delay_ms" => self.retry.min_delay_ms = parse_value(key, value)?,
                "retry_factor" => self.retry.factor = parse_value(key, value)?,
                "retry_max_delay_ms" => self.retry.max_delay_ms = parse_value(key, value)?,
                "retry_jitter" => self.retry.jitter = parse_value(key, value)?,

                "breaker_failure_threshold" => {
                    self.breaker.failure_threshold = parse_value(key, value)?
                }
                "breaker_minimum_calls" => self.breaker.minimum_calls = parse_value(key, value)?,
                "breaker_reset_timeout_ms" => {
                    self.breaker.reset_timeout_ms = parse_value(key, value)?
                }
                "breaker_window_ms" => self.breaker.window_ms = parse_value(key, value)?,
                "breaker_window_buckets" => {
                    self.breaker.window_buckets = parse_value(key, value)?
                }
                "breaker_half_open_max_calls" => {
                    self.breaker.half_open_max_calls = parse_value(key, value)?
                }
                "breaker_success_threshold" => {
                    self.breaker.success_threshold = parse_value(key, value)?
                }
                "breaker_call_timeout_ms" => {
                    self.breaker.call_timeout_ms = Some(parse_value(key, value)?)
                }
                "breaker_open_circuit" => self.breaker.open_circuit = value.parse()?,

                "cache_url" => self.cache.url = Some(value.to_string()),
                "cache_key_prefix" => self.cache.key_prefix = value.to_string(),
                "cache_connect_attempts" => {
                    self.cache.connect_attempts = parse_value(key, value)?
                }
                "cache_connect_base_delay_ms" => {
                    self.cache.connect_base_delay_ms = parse_value(key, value)?
                }
                "cache_max_retries" => self.cache.max_retries = parse_value(key, value)?,

                "rate_limit_store_url" => self.rate_limit.store_url = Some(value.to_string()),
                "rate_limit_key_prefix" => self.rate_limit.key_prefix = value.to_string(),
                "rate_limit_points" => self.rate_limit.points = parse_value(key, value)?,
                "rate_limit_duration_secs" => {
                    self.rate_limit.duration_secs = parse_value(key, value)?
                }
                "rate_limit_block_duration_secs" => {
                    self.rate_limit.block_duration_secs = parse_value(key, value)?
                }
                "rate_limit_burst_points" => {
                    self.rate_limit.burst_points = parse_value(key, value)?
                }
                "rate_limit_burst_duration_secs" => {
                    self.rate_limit.burst_duration_secs = parse_value(key, value)?
                }
                "rate_limit_policy" => self.rate_limit.on_store_failure = value.parse()?,
                "rate_limit_exempt_prefixes" => {
                    self.rate_limit.exempt_prefixes = split_list(value)
                }
                "rate_limit_bot_patterns" => {
                    self.rate_limit.bot_patterns = split_list(value)
                        .into_iter()
                        .map(|p| p.to_ascii_lowercase())
                        .collect()
                }
                "rate_limit_enforce_in_non_production" => {
                    self.rate_limit.enforce_in_non_production = parse_value(key, value)?
                }

                other => {
                    if let Some(name) = other
                        .strip_prefix("service_")
                        .and_then(|rest| rest.strip_suffix("_url"))
                        && !name.is_empty()
                    {
                        self.services
                            .insert(name.replace('_', "-"), value.trim().to_string());
                    } else {
                        debug!(key = %other, "ignoring unknown configuration variable");
                    }
                }
            }
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.environment, "environment")?;
        ConfigValidator::positive(self.http.timeout_ms, "http.timeout_ms")?;

        ConfigValidator::in_range(self.retry.factor, 1.0, f64::MAX, "retry.factor")?;
        ConfigValidator::in_range(self.retry.jitter, 0.0, 1.0, "retry.jitter")?;
        if self.retry.max_delay_ms < self.retry.min_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.max_delay_ms must not be below retry.min_delay_ms".to_string(),
            ));
        }

        if self.breaker.failure_threshold <= 0.0 || self.breaker.failure_threshold > 100.0 {
            return Err(ConfigError::ValidationError(format!(
                "breaker.failure_threshold must be in (0, 100], got {}",
                self.breaker.failure_threshold
            )));
        }
        ConfigValidator::positive(self.breaker.minimum_calls.into(), "breaker.minimum_calls")?;
        ConfigValidator::positive(self.breaker.window_ms, "breaker.window_ms")?;
        ConfigValidator::positive(self.breaker.window_buckets.into(), "breaker.window_buckets")?;
        ConfigValidator::positive(
            self.breaker.half_open_max_calls.into(),
            "breaker.half_open_max_calls",
        )?;
        ConfigValidator::positive(
            self.breaker.success_threshold.into(),
            "breaker.success_threshold",
        )?;

        if let Some(url) = &self.cache.url {
            ConfigValidator::is_url(url, "cache.url")?;
        }
        ConfigValidator::positive(self.cache.connect_attempts.into(), "cache.connect_attempts")?;

        let limits = &self.rate_limit;
        if let Some(url) = &limits.store_url {
            ConfigValidator::is_url(url, "rate_limit.store_url")?;
        }
        ConfigValidator::positive(limits.points.into(), "rate_limit.points")?;
        ConfigValidator::positive(limits.duration_secs, "rate_limit.duration_secs")?;
        ConfigValidator::positive(limits.burst_points.into(), "rate_limit.burst_points")?;
        ConfigValidator::positive(limits.burst_duration_secs, "rate_limit.burst_duration_secs")?;
        for route in &limits.routes {
            ConfigValidator::not_empty(&route.prefix, "rate_limit.routes.prefix")?;
            ConfigValidator::not_empty(&route.name, "rate_limit.routes.name")?;
            ConfigValidator::positive(route.points.into(), "rate_limit.routes.points")?;
            ConfigValidator::positive(route.duration_secs, "rate_limit.routes.duration_secs")?;
        }

        for (name, url) in &self.services {
            ConfigValidator::not_empty(name, "services")?;
            ConfigValidator::is_url(url, &format!("services.{name}"))?;
        }

        Ok(())
    }
}

/// Layered settings loader: defaults, then a file, then `.env`, then the
/// process environment.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    dotenv: bool,
    prefix: String,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            dotenv: true,
            prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Read a JSON or TOML file before applying the environment.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enable or disable loading `.env` from the working directory.
    pub fn with_dotenv(mut self, enabled: bool) -> Self {
        self.dotenv = enabled;
        self
    }

    /// Use a different environment prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Load from the real process environment.
    pub fn load(&self) -> Result<Settings> {
        if self.dotenv {
            // A missing .env file is not an error.
            dotenvy::dotenv().ok();
        }
        let vars = EnvLoader::new(Some(self.prefix.clone())).load();
        self.load_with_vars(&vars)
    }

    /// Load using an explicit, already prefix-stripped variable map.
    pub fn load_with_vars(&self, vars: &HashMap<String, String>) -> Result<Settings> {
        let mut settings = match &self.file {
            Some(path) => {
                let value = ConfigLoader::auto(path)?.load_file(path)?;
                serde_json::from_value(value).map_err(|e| {
                    ConfigError::ParseError(format!("{}: {}", path.display(), e))
                })?
            }
            None => Settings::default(),
        };

        settings.apply_env(vars)?;
        settings.validate()?;

        debug!(
            environment = %settings.environment,
            services = settings.services.len(),
            "settings loaded"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!(!settings.is_production());
        assert_eq!(settings.retry.max_retries, 2);
        assert_eq!(settings.breaker.reset_timeout_ms, 30_000);
        assert_eq!(settings.rate_limit.points, 100);
        assert_eq!(settings.rate_limit.duration_secs, 900);
        assert_eq!(settings.rate_limit.on_store_failure, FailureMode::FailOpen);
        assert_eq!(settings.rate_limit.exempt_prefixes, vec!["/api/auth"]);
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_env(&vars(&[
                ("env", "production"),
                ("http_timeout_ms", "2500"),
                ("retry_factor", "3"),
                ("breaker_call_timeout_ms", "15000"),
                ("rate_limit_policy", "fail-closed"),
                ("rate_limit_exempt_prefixes", "/api/auth, /health"),
                ("service_user_profile_url", "http://profiles:8080"),
            ]))
            .unwrap();

        assert!(settings.is_production());
        assert_eq!(settings.http.timeout_ms, 2500);
        assert_eq!(settings.retry.factor, 3.0);
        assert_eq!(settings.breaker.call_timeout_ms, Some(15_000));
        assert_eq!(settings.rate_limit.on_store_failure, FailureMode::FailClosed);
        assert_eq!(settings.rate_limit.exempt_prefixes, vec!["/api/auth", "/health"]);
        assert_eq!(
            settings.services.get("user-profile").map(String::as_str),
            Some("http://profiles:8080")
        );
    }

    #[test]
    fn test_apply_env_covers_tuning_knobs() {
        let mut settings = Settings::default();
        settings
            .apply_env(&vars(&[
                ("breaker_window_buckets", "20"),
                ("cache_connect_base_delay_ms", "50"),
                ("rate_limit_bot_patterns", "Curl, wget ,,python-requests"),
            ]))
            .unwrap();

        assert_eq!(settings.breaker.window_buckets, 20);
        assert_eq!(settings.cache.connect_base_delay_ms, 50);
        assert_eq!(
            settings.rate_limit.bot_patterns,
            vec!["curl", "wget", "python-requests"]
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_apply_env_rejects_garbage() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(&vars(&[("retry_max_retries", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_failures() {
        let mut settings = Settings::default();
        settings.breaker.failure_threshold = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.rate_limit.points = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.services.insert("mail".into(), "mail:25".into());
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_failure_mode_parse() {
        assert_eq!("fail-open".parse::<FailureMode>().unwrap(), FailureMode::FailOpen);
        assert_eq!("FAIL_CLOSED".parse::<FailureMode>().unwrap(), FailureMode::FailClosed);
        assert!("sometimes".parse::<FailureMode>().is_err());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let settings: Settings =
            serde_json::from_value(serde_json::json!({ "retry": { "max_retries": 5 } })).unwrap();
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.min_delay_ms, 100);
        assert_eq!(settings.http.timeout_ms, 10_000);
    }
}
