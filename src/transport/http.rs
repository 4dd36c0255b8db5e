use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde_json::Value;

use super::{
    Method, ProgressStream, Transport, TransportError, TransportRequest, TransportResponse,
};
use crate::config::Config;

/// reqwest-backed [`Transport`].
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Invalid {
                url: String::new(),
                message: format!("Failed to build http client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }

    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Self::new(config.connect_timeout(), config.request_timeout())
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    fn map_send_error(url: &str, timeout: Duration, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
                after: timeout,
            }
        } else if err.is_builder() {
            TransportError::Invalid {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            TransportError::Connection {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let TransportRequest {
            url,
            params,
            upload,
            progress,
        } = request;

        let mut builder = self
            .client
            .request(Self::method(params.method), &url)
            .timeout(self.timeout);

        match upload {
            Some(upload) => {
                // multipart sets its own content type
                for (name, value) in &params.headers {
                    if !name.eq_ignore_ascii_case("content-type") {
                        builder = builder.header(name, value);
                    }
                }
                let len = upload.len() as u64;
                let stream = ProgressStream::new(upload.bytes.clone(), progress);
                let part = Part::stream_with_length(Body::wrap_stream(stream), len)
                    .file_name(upload.file_name.clone())
                    .mime_str(&upload.content_type)
                    .map_err(|e| TransportError::Invalid {
                        url: url.clone(),
                        message: format!("Invalid content type '{}': {}", upload.content_type, e),
                    })?;
                let mut form = Form::new().part(upload.field_name.clone(), part);
                for (name, value) in &upload.fields {
                    form = form.text(name.clone(), value.clone());
                }
                builder = builder.multipart(form);
            }
            None => {
                for (name, value) in &params.headers {
                    builder = builder.header(name, value);
                }
                if let Some(body) = &params.body {
                    let bytes = serde_json::to_vec(body).map_err(|e| TransportError::Invalid {
                        url: url.clone(),
                        message: format!("Failed to encode body: {}", e),
                    })?;
                    builder = builder.body(bytes);
                }
            }
        }

        tracing::debug!(method = %params.method, url = %url, "Sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_send_error(&url, self.timeout, e))?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| TransportError::Body {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        tracing::debug!(url = %url, status, "Received response");
        Ok(TransportResponse { status, body })
    }
}
