use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server endpoint and transport timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base endpoint relative urls are joined to (e.g., "https://api.example.com/api/v1").
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Total timeout for one attempt in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Connection timeout in seconds (default: 5).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
}

/// Default retry policy for requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Backoff growth factor; each delay is the previous one times `1 + decay`.
    #[serde(default = "default_decay")]
    pub decay: f64,
    /// First retry delay in milliseconds.
    #[serde(default = "default_initial_retry_ms")]
    pub initial_retry_ms: u64,
    /// Upper bound on a single retry delay in milliseconds.
    #[serde(default = "default_max_retry_ms")]
    pub max_retry_ms: u64,
    /// Retries before a request is declared fatal.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
}

/// Default polling cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

/// Access token refresh settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Seconds between token refreshes (default: 150).
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    /// Path of the refresh endpoint, relative to `api.endpoint`.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
}

fn default_endpoint() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_timeout() -> u32 {
    30
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_decay() -> f64 {
    0.3
}

fn default_initial_retry_ms() -> u64 {
    500
}

fn default_max_retry_ms() -> u64 {
    10_000
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_poll_ms() -> u64 {
    2_000
}

fn default_max_poll_attempts() -> u32 {
    200
}

fn default_refresh_seconds() -> u64 {
    150
}

fn default_refresh_path() -> String {
    "/token/refresh/".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            decay: default_decay(),
            initial_retry_ms: default_initial_retry_ms(),
            max_retry_ms: default_max_retry_ms(),
            max_retry_attempts: default_max_retry_attempts(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_ms: default_poll_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_seconds: default_refresh_seconds(),
            refresh_path: default_refresh_path(),
        }
    }
}
