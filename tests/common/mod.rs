//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_backend;

use async_trait::async_trait;
use deeprest::transport::{
    Transport, TransportError, TransportRequest, TransportResponse,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, Value),
    Error(TransportError),
    /// Reply after a delay (virtual time under `start_paused`).
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Reply::Status(200, body)
    }

    pub fn unavailable() -> Self {
        Reply::Status(503, Value::Null)
    }

    pub fn refused() -> Self {
        Reply::Error(TransportError::Connection {
            url: "http://test".to_string(),
            message: "connection refused".to_string(),
        })
    }

    pub fn after(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }
}

/// Transport that replays a script and records every request it gets.
///
/// Once the script runs out it keeps answering `{"ok": true}`.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Reply>>>,
    sent: Arc<Mutex<Vec<TransportRequest>>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(replies.into_iter().collect())),
            sent: Arc::default(),
        }
    }

    pub fn sent(&self) -> Vec<TransportRequest> {
        self.sent.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.sent.lock().push(request);
        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::ok(serde_json::json!({"ok": true})));
        play(reply).await
    }
}

async fn play(mut reply: Reply) -> Result<TransportResponse, TransportError> {
    loop {
        match reply {
            Reply::Status(status, body) => return Ok(TransportResponse::new(status, body)),
            Reply::Error(e) => return Err(e),
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

/// Ordered log of callback names.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }
}

/// Writes `content` to a config file in a fresh temp dir.
pub fn temp_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, content).expect("Failed to write config");
    (temp_dir, path)
}
