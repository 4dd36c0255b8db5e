//! Per-attempt resolution of url and params.
//!
//! Every attempt (first try, retry or poll) asks its context for a fresh
//! target, so state that changes between attempts, like a refreshed access
//! token or a pagination cursor, is picked up without rebuilding the request.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::transport::RequestParams;
use crate::update::UpdateError;

pub type ParamsFn = Arc<dyn Fn() -> RequestParams + Send + Sync>;

/// Url and params for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptTarget {
    pub url: String,
    pub params: RequestParams,
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to transform params: {0}")]
    Update(#[from] UpdateError),

    #[error("Failed to encode params: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Produces the target of each attempt.
pub trait AttemptContext: Send + Sync {
    fn prepare(&self) -> Result<AttemptTarget, ContextError>;
}

/// A url given literally or computed at attempt time.
#[derive(Clone)]
pub enum UrlSource {
    Static(String),
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl UrlSource {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        UrlSource::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self) -> String {
        match self {
            UrlSource::Static(url) => url.clone(),
            UrlSource::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for UrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlSource::Static(url) => f.debug_tuple("Static").field(url).finish(),
            UrlSource::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for UrlSource {
    fn from(url: &str) -> Self {
        UrlSource::Static(url.to_string())
    }
}

impl From<String> for UrlSource {
    fn from(url: String) -> Self {
        UrlSource::Static(url)
    }
}

/// Context assembled from a url source and a params producer.
pub struct ClosureContext {
    url: UrlSource,
    params: Option<ParamsFn>,
}

impl ClosureContext {
    pub fn new(url: UrlSource, params: Option<ParamsFn>) -> Self {
        Self { url, params }
    }
}

impl AttemptContext for ClosureContext {
    fn prepare(&self) -> Result<AttemptTarget, ContextError> {
        Ok(AttemptTarget {
            url: self.url.resolve(),
            params: self.params.as_ref().map(|f| f()).unwrap_or_else(RequestParams::get),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn dynamic_url_is_resolved_each_time() {
        let page = Arc::new(AtomicU32::new(1));
        let counter = page.clone();
        let context = ClosureContext::new(
            UrlSource::dynamic(move || format!("/leads/?page={}", counter.fetch_add(1, Ordering::SeqCst))),
            None,
        );

        assert_eq!(context.prepare().unwrap().url, "/leads/?page=1");
        assert_eq!(context.prepare().unwrap().url, "/leads/?page=2");
    }

    #[test]
    fn params_default_to_get() {
        let context = ClosureContext::new("/projects/".into(), None);
        assert_eq!(context.prepare().unwrap().params, RequestParams::get());
    }
}
