use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportError;

/// Lifecycle of the current run of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    InFlight,
    RetryWait,
    PollWait,
    Succeeded,
    Failed,
    Fatal,
    /// The response did not match the declared schema.
    Invalid,
    Stopped,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Succeeded
                | RequestState::Failed
                | RequestState::Fatal
                | RequestState::Invalid
                | RequestState::Stopped
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Idle => "idle",
            RequestState::InFlight => "in-flight",
            RequestState::RetryWait => "retry-wait",
            RequestState::PollWait => "poll-wait",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
            RequestState::Fatal => "fatal",
            RequestState::Invalid => "invalid",
            RequestState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why the last retryable attempt failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Server responded with status {status}")]
    Status { status: u16 },
}

/// Unrecoverable outcome handed to the `fatal` callback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FatalError {
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: AttemptError },

    #[error("Server responded with status {status}")]
    Status { status: u16, body: Value },

    #[error(transparent)]
    Transport(TransportError),

    #[error("Failed to prepare request: {0}")]
    Context(String),
}
