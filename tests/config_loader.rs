mod common;

use std::time::Duration;

use common::temp_config;
use deeprest::config::{Config, ConfigError};
use deeprest::request::{PollPolicy, RetryPolicy};

/// Test that Config::default() produces the expected values.
#[test]
fn test_config_default_values() {
    let config = Config::default();

    assert_eq!(config.api.endpoint, "http://localhost:8000/api/v1");
    assert_eq!(config.api.timeout_seconds, 30);
    assert_eq!(config.api.connect_timeout_seconds, 5);

    assert_eq!(config.retry.decay, 0.3);
    assert_eq!(config.retry.initial_retry_ms, 500);
    assert_eq!(config.retry.max_retry_ms, 10_000);
    assert_eq!(config.retry.max_retry_attempts, 5);

    assert_eq!(config.poll.poll_ms, 2_000);
    assert_eq!(config.poll.max_poll_attempts, 200);

    assert_eq!(config.auth.refresh_seconds, 150);
    assert_eq!(config.auth.refresh_path, "/token/refresh/");
}

#[test]
fn test_default_policies_match_engine_defaults() {
    let config = Config::default();
    assert_eq!(config.retry_policy(), RetryPolicy::default());
    assert_eq!(config.poll_policy(), PollPolicy::default());
}

#[test]
fn test_config_path_ends_with_expected() {
    let path = Config::config_path();
    assert!(path.ends_with("deeprest/config.toml"));
}

#[test]
fn test_missing_file_gives_defaults() {
    let (dir, _) = temp_config("");
    let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let (_dir, path) = temp_config(
        r#"
[api]
endpoint = "https://api.example.com/api/v1"

[retry]
max_retry_attempts = 10
initial_retry_ms = 250
"#,
    );

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.api.endpoint, "https://api.example.com/api/v1");
    assert_eq!(config.api.timeout_seconds, 30);
    assert_eq!(config.retry.max_retry_attempts, 10);
    assert_eq!(config.retry.decay, 0.3);

    let retry = config.retry_policy();
    assert_eq!(retry.initial_retry_time, Duration::from_millis(250));
    assert_eq!(retry.max_retry_time, Duration::from_secs(10));
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let (_dir, path) = temp_config("[retry\nbroken = ");
    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

#[test]
fn test_validation_rejects_non_http_endpoint() {
    let (_dir, path) = temp_config("[api]\nendpoint = \"ftp://example.com\"\n");
    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError { .. }));
    assert!(err.to_string().contains("ftp://example.com"));
}

#[test]
fn test_validation_rejects_inverted_retry_window() {
    let mut config = Config::default();
    config.retry.initial_retry_ms = 5_000;
    config.retry.max_retry_ms = 1_000;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError { .. })
    ));
}

#[test]
fn test_validation_rejects_negative_decay_and_zero_poll() {
    let mut config = Config::default();
    config.retry.decay = -0.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.poll.poll_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_roundtrips_through_toml() {
    let config = Config::default();
    let text = toml::to_string(&config).unwrap();
    let (_dir, path) = temp_config(&text);
    assert_eq!(Config::load_from(&path).unwrap(), config);
}
