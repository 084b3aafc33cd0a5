//! `QUESTLINE_*` environment variables.

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Reads variables under a prefix, e.g. `QUESTLINE`.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load all environment variables under the prefix.
    ///
    /// Keys come back lowercased with the prefix and its separator removed,
    /// so `QUESTLINE_HTTP_TIMEOUT_MS` becomes `http_timeout_ms`.
    pub fn load(&self) -> HashMap<String, String> {
        self.filter(env::vars())
    }

    /// Apply the prefix filter to an arbitrary set of variables.
    pub fn filter<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| {
                let key = match &self.prefix {
                    Some(prefix) => key
                        .strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_prefix('_'))
                        .filter(|rest| !rest.is_empty())?
                        .to_lowercase(),
                    None => key.to_lowercase(),
                };
                Some((key, value))
            })
            .collect()
    }

    /// Read one variable, `key` without the prefix.
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.full_key(key)).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Load and parse a variable, returning `None` when it is unset.
    pub fn parse_var<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.load_var(key) {
            Ok(raw) => parse_value(&self.full_key(key), &raw).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{}", key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Parse one raw value, naming the key in the error.
pub fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::invalid_value(key, raw, std::any::type_name::<T>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // std::env::set_var is unsafe in edition 2024, so prefix handling is
    // exercised through `filter` with explicit variables.

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_loader_with_default() {
        let loader = EnvLoader::new(None);
        let value = loader.load_var_or("NONEXISTENT_VAR_12345", "default");

        assert_eq!(value, "default");
    }

    #[test]
    fn test_env_loader_missing_var() {
        let loader = EnvLoader::new(Some("QUESTLINE_TEST".to_string()));
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
        assert!(matches!(loader.parse_var::<u64>("MISSING_VAR_67890"), Ok(None)));
    }

    #[test]
    fn test_filter_strips_prefix() {
        let loader = EnvLoader::new(Some("QUESTLINE".to_string()));
        let loaded = loader.filter(vars(&[
            ("QUESTLINE_HTTP_TIMEOUT_MS", "2500"),
            ("QUESTLINE_SERVICE_PROFILES_URL", "http://profiles:8080"),
            ("QUESTLINEX_OTHER", "ignored"),
            ("QUESTLINE", "ignored"),
            ("PATH", "/usr/bin"),
        ]));

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("http_timeout_ms").map(String::as_str), Some("2500"));
        assert!(loaded.contains_key("service_profiles_url"));
    }

    #[test]
    fn test_filter_without_prefix_keeps_everything() {
        let loader = EnvLoader::default();
        let loaded = loader.filter(vars(&[("Foo", "1"), ("BAR", "2")]));
        assert_eq!(loaded.get("foo").map(String::as_str), Some("1"));
        assert_eq!(loaded.get("bar").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u32>("K", " 42 ").unwrap(), 42);
        assert!(parse_value::<f64>("K", "1.5").is_ok());

        let err = parse_value::<u64>("QUESTLINE_HTTP_TIMEOUT_MS", "soon").unwrap_err();
        assert!(err.to_string().contains("QUESTLINE_HTTP_TIMEOUT_MS"));
    }
}
