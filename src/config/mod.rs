mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{ApiConfig, AuthConfig, Config, PollConfig, RetryConfig};
