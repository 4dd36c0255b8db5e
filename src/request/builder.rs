use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::callbacks::{Callbacks, ShouldPollFn};
use super::context::{AttemptContext, ClosureContext, ParamsFn, UrlSource};
use super::policy::{PollPolicy, RetryPolicy};
use super::state::FatalError;
use super::Request;
use crate::schema::{SchemaError, Validator};
use crate::transport::{RequestParams, Transport, TransportResponse, Upload};

/// Configuration errors caught by [`RequestBuilder::build`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("Request has no url or context")]
    MissingTarget,

    #[error("Request has both a context and a url/params producer")]
    ConflictingTarget,

    #[error("Decay must be a non-negative number, got {0}")]
    InvalidDecay(f64),

    #[error("max_retry_time ({max:?}) is below initial_retry_time ({initial:?})")]
    InvertedRetryWindow { initial: Duration, max: Duration },

    #[error("Poll time must be greater than zero")]
    ZeroPollTime,

    #[error("Poll settings given without a should_poll predicate")]
    PollWithoutPredicate,

    #[error("Schema '{0}' declared without a validator")]
    SchemaWithoutValidator(String),
}

/// Frozen configuration shared by every run of a [`Request`].
pub(crate) struct RequestConfig {
    pub transport: Arc<dyn Transport>,
    pub context: Arc<dyn AttemptContext>,
    pub schema: Option<(String, Arc<dyn Validator>)>,
    pub retry: RetryPolicy,
    pub poll: Option<(PollPolicy, ShouldPollFn)>,
    pub upload: Option<Upload>,
    pub callbacks: Callbacks,
}

/// Fluent configuration for a [`Request`].
///
/// Options may be given in any order; [`RequestBuilder::build`] validates
/// and freezes them.
pub struct RequestBuilder {
    transport: Arc<dyn Transport>,
    url: Option<UrlSource>,
    params: Option<ParamsFn>,
    context: Option<Arc<dyn AttemptContext>>,
    schema: Option<String>,
    validator: Option<Arc<dyn Validator>>,
    retry: RetryPolicy,
    poll: Option<PollPolicy>,
    should_poll: Option<ShouldPollFn>,
    upload: Option<Upload>,
    callbacks: Callbacks,
}

impl RequestBuilder {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self::with_transport(Arc::new(transport))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            url: None,
            params: None,
            context: None,
            schema: None,
            validator: None,
            retry: RetryPolicy::default(),
            poll: None,
            should_poll: None,
            upload: None,
            callbacks: Callbacks::default(),
        }
    }

    pub fn url(mut self, url: impl Into<UrlSource>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Url computed fresh for every attempt.
    pub fn url_fn<F>(self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.url(UrlSource::dynamic(f))
    }

    /// Params produced fresh for every attempt.
    pub fn params<F>(mut self, f: F) -> Self
    where
        F: Fn() -> RequestParams + Send + Sync + 'static,
    {
        self.params = Some(Arc::new(f));
        self
    }

    pub fn static_params(self, params: RequestParams) -> Self {
        self.params(move || params.clone())
    }

    /// Replaces `url`/`params` with an injected per-attempt provider.
    pub fn context(mut self, context: Arc<dyn AttemptContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schema = Some(name.into());
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn decay(mut self, decay: f64) -> Self {
        self.retry.decay = decay;
        self
    }

    pub fn initial_retry_time(mut self, delay: Duration) -> Self {
        self.retry.initial_retry_time = delay;
        self
    }

    pub fn max_retry_time(mut self, delay: Duration) -> Self {
        self.retry.max_retry_time = delay;
        self
    }

    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_retry_attempts = attempts;
        self
    }

    pub fn poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = Some(poll);
        self
    }

    pub fn poll_time(mut self, poll_time: Duration) -> Self {
        self.poll.get_or_insert_with(PollPolicy::default).poll_time = poll_time;
        self
    }

    pub fn max_poll_attempts(mut self, attempts: u32) -> Self {
        self.poll.get_or_insert_with(PollPolicy::default).max_poll_attempts = attempts;
        self
    }

    pub fn should_poll<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.should_poll = Some(Arc::new(f));
        self
    }

    pub fn pre_load<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.pre_load = Some(Arc::new(f));
        self
    }

    pub fn post_load<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.post_load = Some(Arc::new(f));
        self
    }

    pub fn success<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.callbacks.success = Some(Arc::new(f));
        self
    }

    /// Receives the successful responses that keep polling going.
    pub fn on_poll<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.callbacks.poll = Some(Arc::new(f));
        self
    }

    pub fn failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&TransportResponse) + Send + Sync + 'static,
    {
        self.callbacks.failure = Some(Arc::new(f));
        self
    }

    pub fn fatal<F>(mut self, f: F) -> Self
    where
        F: Fn(&FatalError) + Send + Sync + 'static,
    {
        self.callbacks.fatal = Some(Arc::new(f));
        self
    }

    pub fn schema_mismatch<F>(mut self, f: F) -> Self
    where
        F: Fn(&SchemaError, &Value) + Send + Sync + 'static,
    {
        self.callbacks.schema_mismatch = Some(Arc::new(f));
        self
    }

    /// Upload progress in percent.
    pub fn progress<F>(mut self, f: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.callbacks.progress = Some(Arc::new(f));
        self
    }

    pub fn file(mut self, upload: Upload) -> Self {
        self.upload = Some(upload);
        self
    }

    /// Validates the configuration and returns an idle request.
    pub fn build(self) -> Result<Request, BuildError> {
        let context: Arc<dyn AttemptContext> = match (self.context, self.url) {
            (Some(_), Some(_)) => return Err(BuildError::ConflictingTarget),
            (Some(_), None) if self.params.is_some() => return Err(BuildError::ConflictingTarget),
            (Some(context), None) => context,
            (None, Some(url)) => Arc::new(ClosureContext::new(url, self.params)),
            (None, None) => return Err(BuildError::MissingTarget),
        };

        let retry = self.retry;
        if !retry.decay.is_finite() || retry.decay < 0.0 {
            return Err(BuildError::InvalidDecay(retry.decay));
        }
        if retry.max_retry_time < retry.initial_retry_time {
            return Err(BuildError::InvertedRetryWindow {
                initial: retry.initial_retry_time,
                max: retry.max_retry_time,
            });
        }

        let poll = match (self.poll, self.should_poll) {
            (Some(_), None) => return Err(BuildError::PollWithoutPredicate),
            (poll, Some(predicate)) => {
                let poll = poll.unwrap_or_default();
                if poll.poll_time.is_zero() {
                    return Err(BuildError::ZeroPollTime);
                }
                Some((poll, predicate))
            }
            (None, None) => None,
        };

        let schema = match (self.schema, self.validator) {
            (Some(name), Some(validator)) => Some((name, validator)),
            (Some(name), None) => return Err(BuildError::SchemaWithoutValidator(name)),
            (None, _) => None,
        };

        Ok(Request::from_config(RequestConfig {
            transport: self.transport,
            context,
            schema,
            retry,
            poll,
            upload: self.upload,
            callbacks: self.callbacks,
        }))
    }
}
