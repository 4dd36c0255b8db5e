use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::config::types::Config;
use crate::request::{PollPolicy, RetryPolicy};

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/deeprest/config.toml` on Unix/macOS,
    /// or equivalent on other platforms via `dirs::config_dir()`.
    /// Falls back to current directory if config_dir is unavailable.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("deeprest").join("config.toml")
    }

    /// Loads configuration from the default config file.
    ///
    /// - If the file doesn't exist, returns `Config::default()`.
    /// - If the file exists, parses it as TOML and validates.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from an explicit path, with the same fallback
    /// rules as [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - The endpoint is an http(s) url
    /// - Decay is finite and not negative
    /// - The retry window is not inverted
    /// - Poll interval is non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = &self.api.endpoint;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::ValidationError {
                message: format!("api.endpoint '{}' must start with http:// or https://", endpoint),
            });
        }

        if !self.retry.decay.is_finite() || self.retry.decay < 0.0 {
            return Err(ConfigError::ValidationError {
                message: format!("retry.decay must be a non-negative number, got {}", self.retry.decay),
            });
        }

        if self.retry.max_retry_ms < self.retry.initial_retry_ms {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "retry.max_retry_ms ({}) is below retry.initial_retry_ms ({})",
                    self.retry.max_retry_ms, self.retry.initial_retry_ms
                ),
            });
        }

        if self.poll.poll_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "poll.poll_ms must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            decay: self.retry.decay,
            initial_retry_time: Duration::from_millis(self.retry.initial_retry_ms),
            max_retry_time: Duration::from_millis(self.retry.max_retry_ms),
            max_retry_attempts: self.retry.max_retry_attempts,
        }
    }

    /// Poll cadence from config; the continuation predicate is the caller's.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll.poll_ms),
            self.poll.max_poll_attempts,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.api.timeout_seconds))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.api.connect_timeout_seconds))
    }
}
