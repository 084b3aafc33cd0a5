//! File and environment layering.

use questline_config::{ConfigError, FailureMode, SettingsLoader};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("questline-config-{}-{}", std::process::id(), name));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn toml_file_then_env_overrides() {
    let path = write_temp(
        "layered.toml",
        r#"
environment = "production"

[retry]
max_retries = 4

[rate_limit]
points = 50
duration_secs = 60

[[rate_limit.routes]]
prefix = "/api/adventures"
name = "adventures"
points = 20
duration_secs = 60

[services]
notifications = "http://notifications:7000"
"#,
    );

    let mut vars = HashMap::new();
    vars.insert("retry_max_retries".to_string(), "1".to_string());

    let settings = SettingsLoader::new()
        .with_dotenv(false)
        .with_file(&path)
        .load_with_vars(&vars)
        .unwrap();

    assert!(settings.is_production());
    assert_eq!(settings.retry.max_retries, 1);
    assert_eq!(settings.rate_limit.points, 50);
    assert_eq!(settings.rate_limit.routes.len(), 1);
    assert_eq!(settings.rate_limit.routes[0].block_duration_secs, 0);
    assert_eq!(settings.rate_limit.on_store_failure, FailureMode::FailOpen);
    assert_eq!(
        settings.services.get("notifications").map(String::as_str),
        Some("http://notifications:7000")
    );

    std::fs::remove_file(path).ok();
}

#[test]
fn json_file_is_supported() {
    let path = write_temp(
        "settings.json",
        r#"{ "breaker": { "minimum_calls": 10, "open_circuit": "fail-open" } }"#,
    );

    let settings = SettingsLoader::new()
        .with_dotenv(false)
        .with_file(&path)
        .load_with_vars(&HashMap::new())
        .unwrap();

    assert_eq!(settings.breaker.minimum_calls, 10);
    assert_eq!(settings.breaker.open_circuit, FailureMode::FailOpen);

    std::fs::remove_file(path).ok();
}

#[test]
fn invalid_file_values_fail_validation() {
    let path = write_temp("invalid.json", r#"{ "rate_limit": { "points": 0 } }"#);

    let err = SettingsLoader::new()
        .with_dotenv(false)
        .with_file(&path)
        .load_with_vars(&HashMap::new())
        .unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));

    std::fs::remove_file(path).ok();
}

#[test]
fn missing_file_is_a_load_error() {
    let err = SettingsLoader::new()
        .with_dotenv(false)
        .with_file("/nonexistent/questline.toml")
        .load_with_vars(&HashMap::new())
        .unwrap_err();
    assert!(matches!(err, ConfigError::LoadError(_)));
}
