//! Transport abstraction for the request engine.
//!
//! The engine only needs one async call that either returns a structured
//! response or fails at the transport level. [`HttpTransport`] is the
//! reqwest-backed implementation; tests substitute scripted transports.

mod http;
mod upload;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use http::HttpTransport;
pub use upload::{ProgressStream, Upload};

/// Progress sink for uploads; receives completion in percent (0..=100).
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Status codes retried when the body carries no structured error.
const TRANSIENT_STATUSES: [u16; 5] = [408, 429, 502, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method, headers and JSON body of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default)]
    pub method: Method,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestParams {
    pub fn get() -> Self {
        Self {
            method: Method::Get,
            headers: json_headers(false),
            body: None,
        }
    }

    pub fn delete() -> Self {
        Self {
            method: Method::Delete,
            headers: json_headers(false),
            body: None,
        }
    }

    pub fn post(body: Value) -> Self {
        Self::with_body(Method::Post, body)
    }

    pub fn put(body: Value) -> Self {
        Self::with_body(Method::Put, body)
    }

    pub fn patch(body: Value) -> Self {
        Self::with_body(Method::Patch, body)
    }

    fn with_body(method: Method, body: Value) -> Self {
        Self {
            method,
            headers: json_headers(true),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

fn json_headers(with_body: bool) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Accept".to_string(), "application/json".to_string());
    if with_body {
        headers.insert("Content-Type".to_string(), "application/json; charset=utf-8".to_string());
    }
    headers
}

/// Everything a transport needs for one attempt.
#[derive(Clone)]
pub struct TransportRequest {
    pub url: String,
    pub params: RequestParams,
    pub upload: Option<Upload>,
    pub progress: Option<ProgressFn>,
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRequest")
            .field("url", &self.url)
            .field("params", &self.params)
            .field("upload", &self.upload)
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

/// A response as received from the server, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Parsed JSON body; `Null` when empty, a JSON string when not JSON.
    pub body: Value,
}

/// How the engine treats a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Structured application error; reported to `failure`, never retried.
    Failure,
    /// Worth another attempt after backoff.
    Transient,
    /// Unrecoverable; reported to `fatal`.
    Fatal,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body is a server error document (`{"errors": ...}`).
    pub fn has_structured_errors(&self) -> bool {
        self.body
            .as_object()
            .map(|o| o.contains_key("errors"))
            .unwrap_or(false)
    }

    pub fn classify(&self) -> Classification {
        if self.is_success() {
            Classification::Success
        } else if self.has_structured_errors() {
            Classification::Failure
        } else if TRANSIENT_STATUSES.contains(&self.status) {
            Classification::Transient
        } else {
            Classification::Fatal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not reach the server.
    #[error("Connection failed to '{url}': {message}")]
    Connection { url: String, message: String },

    /// The attempt did not finish in time.
    #[error("Request to '{url}' timed out after {}ms", .after.as_millis())]
    Timeout { url: String, after: Duration },

    /// The request could not be built or sent at all.
    #[error("Invalid request to '{url}': {message}")]
    Invalid { url: String, message: String },

    /// The response body could not be read.
    #[error("Failed to read response from '{url}': {message}")]
    Body { url: String, message: String },
}

impl TransportError {
    pub fn classify(&self) -> Classification {
        match self {
            TransportError::Connection { .. }
            | TransportError::Timeout { .. }
            | TransportError::Body { .. } => Classification::Transient,
            TransportError::Invalid { .. } => Classification::Fatal,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request).await
    }
}
