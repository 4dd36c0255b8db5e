//! Shared url and auth handling for requests against the API.
//!
//! Requests built through a [`Coordinator`] resolve relative urls against the
//! configured endpoint and carry the current access token. Both transforms run
//! on every attempt, so a token refreshed between retries is picked up.

use std::sync::Arc;

use crate::auth::TokenSource;
use crate::config::Config;
use crate::request::{
    AttemptContext, AttemptTarget, ContextError, ParamsFn, RequestBuilder, UrlSource,
};
use crate::transport::{RequestParams, Transport};
use crate::update::{self, Spec, Value};

const OLD_VERSION: &str = "/v1";
const NEW_VERSION: &str = "/v2";

/// Body flag that sends a request without credentials.
pub const NO_AUTH_KEY: &str = "$noAuth";

/// Joins `url` to `endpoint`, swapping the endpoint's `/v1` suffix for `/v2`
/// urls.
pub fn versioned_url(endpoint: &str, url: &str) -> String {
    if !url.starts_with(NEW_VERSION) {
        return format!("{}{}", endpoint, url);
    }
    match endpoint.find(OLD_VERSION) {
        Some(index) => format!("{}{}", &endpoint[..index], url),
        None => format!("{}{}", endpoint, url),
    }
}

fn is_absolute(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

#[derive(Clone)]
pub struct Coordinator {
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
    transport: Arc<dyn Transport>,
}

impl Coordinator {
    pub fn new(
        endpoint: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            tokens,
            transport,
        }
    }

    pub fn from_config(
        config: &Config,
        tokens: Arc<dyn TokenSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(config.api.endpoint.clone(), tokens, transport)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn resolve_url(&self, url: &str) -> String {
        if is_absolute(url) {
            url.to_string()
        } else {
            versioned_url(&self.endpoint, url)
        }
    }

    /// Adds the bearer token to `params`.
    ///
    /// A truthy `$noAuth` in the body strips everything but the method.
    pub fn authorize(&self, params: RequestParams) -> Result<RequestParams, ContextError> {
        let no_auth = params
            .body
            .as_ref()
            .and_then(|body| body.get(NO_AUTH_KEY))
            .is_some_and(is_truthy);
        if no_auth {
            tracing::debug!("Sending request without credentials");
            return Ok(RequestParams {
                method: params.method,
                ..RequestParams::default()
            });
        }

        let Some(access) = self.tokens.token().access else {
            return Ok(params);
        };

        let spec = Spec::nested([(
            "headers",
            Spec::auto(Spec::nested([(
                "Authorization",
                Spec::set(format!("Bearer {}", access)),
            )])),
        )]);
        let value = Value::from(serde_json::to_value(&params)?);
        let updated = update::update(&value, &spec)?;
        Ok(serde_json::from_value(serde_json::Value::from(updated))?)
    }

    /// Builder for a GET request through this coordinator.
    pub fn builder(&self, url: impl Into<UrlSource>) -> RequestBuilder {
        self.context_builder(url.into(), None)
    }

    /// Builder whose params are produced fresh for every attempt.
    pub fn builder_with<F>(&self, url: impl Into<UrlSource>, params: F) -> RequestBuilder
    where
        F: Fn() -> RequestParams + Send + Sync + 'static,
    {
        self.context_builder(url.into(), Some(Arc::new(params)))
    }

    fn context_builder(&self, url: UrlSource, params: Option<ParamsFn>) -> RequestBuilder {
        let context = CoordinatedContext {
            coordinator: self.clone(),
            url,
            params,
        };
        RequestBuilder::with_transport(self.transport.clone()).context(Arc::new(context))
    }
}

struct CoordinatedContext {
    coordinator: Coordinator,
    url: UrlSource,
    params: Option<ParamsFn>,
}

impl AttemptContext for CoordinatedContext {
    fn prepare(&self) -> Result<AttemptTarget, ContextError> {
        let params = self
            .params
            .as_ref()
            .map(|f| f())
            .unwrap_or_else(RequestParams::get);
        Ok(AttemptTarget {
            url: self.coordinator.resolve_url(&self.url.resolve()),
            params: self.coordinator.authorize(params)?,
        })
    }
}
