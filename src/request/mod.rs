//! Retryable, pollable, cancellable requests.
//!
//! A [`Request`] is configured once through [`RequestBuilder`] and can be
//! started any number of times. Each start begins a *run*: a sequence of
//! attempts driven by a spawned tokio task.
//!
//! - 2xx responses go to `success`, or keep polling while `should_poll` holds.
//! - Structured error responses go to `failure` and are not retried.
//! - Connection errors, timeouts and gateway statuses are retried with
//!   exponential backoff; once the budget is spent the run turns fatal.
//! - [`Request::stop`] cancels timers and the in-flight call. No callback
//!   starts after `stop` returns.

mod builder;
mod callbacks;
mod cancel;
mod context;
mod policy;
mod state;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

pub use builder::{BuildError, RequestBuilder};
pub use callbacks::{
    FailureFn, FatalFn, HookFn, ProgressCallback, ResponseFn, SchemaMismatchFn, ShouldPollFn,
};
pub use context::{AttemptContext, AttemptTarget, ClosureContext, ContextError, ParamsFn, UrlSource};
pub use policy::{PollPolicy, RetryPolicy};
pub use state::{AttemptError, FatalError, RequestState};

use builder::RequestConfig;
use cancel::CancelToken;

use crate::transport::{Classification, ProgressFn, TransportRequest, TransportResponse};

/// A configured unit of asynchronous work.
///
/// Dropping the request stops it.
pub struct Request {
    shared: Arc<Shared>,
}

/// Weak handle for starting or stopping a request from its own callbacks.
#[derive(Clone)]
pub struct RequestHandle {
    shared: Weak<Shared>,
}

struct Run {
    generation: u64,
    token: CancelToken,
}

struct Shared {
    id: Uuid,
    config: RequestConfig,
    /// Held while a callback runs and while stopping.
    dispatch: ReentrantMutex<()>,
    run: Mutex<Option<Run>>,
    generation: AtomicU64,
    /// Set when the owning `Request` is dropped; handles can no longer start it.
    closed: AtomicBool,
    state: watch::Sender<RequestState>,
}

/// What the engine does after classifying an attempt.
enum Step {
    Success(Value),
    Failure(TransportResponse),
    Retry(AttemptError),
    Fatal(FatalError),
}

impl Request {
    pub fn builder<T: crate::transport::Transport + 'static>(transport: T) -> RequestBuilder {
        RequestBuilder::new(transport)
    }

    pub(crate) fn from_config(config: RequestConfig) -> Self {
        let (state, _) = watch::channel(RequestState::Idle);
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                config,
                dispatch: ReentrantMutex::new(()),
                run: Mutex::new(None),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                state,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Starts a new run, stopping the current one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        Shared::start(&self.shared);
    }

    /// Cancels pending timers and the in-flight call and moves to `Stopped`.
    ///
    /// No callback starts after this returns. That includes the `post_load`
    /// of an attempt that was in flight, so `pre_load` may run once more
    /// than `post_load`.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn state(&self) -> RequestState {
        *self.shared.state.borrow()
    }

    /// Waits until the current run reaches a terminal state.
    ///
    /// Never resolves for a request that was not started.
    pub async fn wait(&self) -> RequestState {
        let mut rx = self.shared.state.subscribe();
        let state = match rx.wait_for(RequestState::is_terminal).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    pub fn handle(&self) -> RequestHandle {
        RequestHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.stop();
    }
}

impl RequestHandle {
    /// Returns false when the request has been dropped.
    pub fn start(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) if !shared.closed.load(Ordering::SeqCst) => {
                Shared::start(&shared);
                true
            }
            _ => false,
        }
    }

    pub fn stop(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.stop();
        }
    }

    pub fn state(&self) -> Option<RequestState> {
        self.shared.upgrade().map(|shared| *shared.state.borrow())
    }
}

impl Shared {
    fn start(this: &Arc<Self>) {
        let _dispatch = this.dispatch.lock();
        let token = CancelToken::new();
        let generation = this.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut run = this.run.lock();
            if let Some(previous) = run.replace(Run {
                generation,
                token: token.clone(),
            }) {
                previous.token.cancel();
                tracing::debug!(request = %this.id, "Superseded previous run");
            }
            this.state.send_replace(RequestState::Idle);
        }

        let span = tracing::debug_span!("request", id = %this.id, run = generation);
        tokio::spawn(Self::drive(this.clone(), token, generation).instrument(span));
    }

    fn stop(&self) {
        let _dispatch = self.dispatch.lock();
        let run = self.run.lock();
        let Some(current) = run.as_ref() else {
            return;
        };
        if current.token.is_cancelled() {
            return;
        }
        current.token.cancel();
        if !self.state.borrow().is_terminal() {
            self.state.send_replace(RequestState::Stopped);
            tracing::debug!(request = %self.id, "Request stopped");
        }
    }

    /// Publishes `state` for the current, uncancelled run only, so a
    /// `Stopped` written by `stop` is never overwritten.
    fn set_state(&self, generation: u64, state: RequestState) {
        let _dispatch = self.dispatch.lock();
        let run = self.run.lock();
        let current = run
            .as_ref()
            .is_some_and(|r| r.generation == generation && !r.token.is_cancelled());
        if current {
            self.state.send_replace(state);
        }
    }

    /// Runs `f` unless the run has been cancelled. Returns whether it ran.
    fn dispatch(&self, token: &CancelToken, f: impl FnOnce()) -> bool {
        let _guard = self.dispatch.lock();
        if token.is_cancelled() {
            return false;
        }
        f();
        true
    }

    /// Moves to a terminal state and fires its callback atomically with
    /// respect to `stop`.
    fn finish(&self, token: &CancelToken, generation: u64, state: RequestState, f: impl FnOnce()) {
        self.dispatch(token, || {
            self.set_state(generation, state);
            f();
        });
    }

    async fn sleep(token: &CancelToken, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn drive(this: Arc<Self>, token: CancelToken, generation: u64) {
        let config = &this.config;
        let callbacks = &config.callbacks;
        let mut attempts: u32 = 0;
        let mut retries: u32 = 0;
        let mut polls: u32 = 0;

        loop {
            if token.is_cancelled() {
                return;
            }

            let target = match config.context.prepare() {
                Ok(target) => target,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to prepare attempt");
                    let error = FatalError::Context(e.to_string());
                    this.finish(&token, generation, RequestState::Fatal, || {
                        if let Some(fatal) = &callbacks.fatal {
                            fatal(&error);
                        }
                    });
                    return;
                }
            };

            this.set_state(generation, RequestState::InFlight);
            let ran = this.dispatch(&token, || {
                if let Some(pre_load) = &callbacks.pre_load {
                    pre_load();
                }
            });
            if !ran {
                return;
            }

            attempts += 1;
            tracing::debug!(attempt = attempts, method = %target.params.method, url = %target.url, "Starting attempt");

            let progress: Option<ProgressFn> = callbacks.progress.as_ref().map(|progress| {
                let shared = this.clone();
                let token = token.clone();
                let progress = progress.clone();
                let sink: ProgressFn = Arc::new(move |percent| {
                    shared.dispatch(&token, || progress(percent));
                });
                sink
            });

            let request = TransportRequest {
                url: target.url,
                params: target.params,
                upload: config.upload.clone(),
                progress,
            };

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(attempt = attempts, "Dropped in-flight attempt");
                    return;
                }
                result = config.transport.send(request) => result,
            };

            let ran = this.dispatch(&token, || {
                if let Some(post_load) = &callbacks.post_load {
                    post_load();
                }
            });
            if !ran {
                return;
            }

            let step = match result {
                Ok(response) => match response.classify() {
                    Classification::Success => Step::Success(response.body),
                    Classification::Failure => Step::Failure(response),
                    Classification::Transient => Step::Retry(AttemptError::Status {
                        status: response.status,
                    }),
                    Classification::Fatal => Step::Fatal(FatalError::Status {
                        status: response.status,
                        body: response.body,
                    }),
                },
                Err(err) => match err.classify() {
                    Classification::Transient => Step::Retry(AttemptError::Transport(err)),
                    _ => Step::Fatal(FatalError::Transport(err)),
                },
            };

            match step {
                Step::Success(body) => {
                    retries = 0;

                    if let Some((schema, validator)) = &config.schema {
                        if let Err(e) = validator.validate(&body, schema) {
                            this.finish(&token, generation, RequestState::Invalid, || {
                                match &callbacks.schema_mismatch {
                                    Some(mismatch) => mismatch(&e, &body),
                                    None => tracing::error!(error = %e, "Response failed schema validation"),
                                }
                            });
                            return;
                        }
                    }

                    if let Some((poll, should_poll)) = &config.poll {
                        let mut again = false;
                        let ran = this.dispatch(&token, || {
                            again = polls < poll.max_poll_attempts && should_poll(&body);
                            if again {
                                if let Some(on_poll) = &callbacks.poll {
                                    on_poll(&body);
                                }
                            }
                        });
                        if !ran {
                            return;
                        }
                        if again {
                            polls += 1;
                            tracing::debug!(poll = polls, delay_ms = poll.poll_time.as_millis() as u64, "Scheduling poll");
                            this.set_state(generation, RequestState::PollWait);
                            if !Self::sleep(&token, poll.poll_time).await {
                                return;
                            }
                            continue;
                        }
                    }

                    tracing::debug!(attempts, polls, "Request succeeded");
                    this.finish(&token, generation, RequestState::Succeeded, || {
                        if let Some(success) = &callbacks.success {
                            success(&body);
                        }
                    });
                    return;
                }
                Step::Failure(response) => {
                    tracing::info!(status = response.status, "Request failed");
                    this.finish(&token, generation, RequestState::Failed, || {
                        if let Some(failure) = &callbacks.failure {
                            failure(&response);
                        }
                    });
                    return;
                }
                Step::Retry(cause) => {
                    if retries >= config.retry.max_retry_attempts {
                        let error = FatalError::RetriesExhausted {
                            attempts,
                            last: cause,
                        };
                        tracing::warn!(error = %error, "Retries exhausted");
                        this.finish(&token, generation, RequestState::Fatal, || {
                            if let Some(fatal) = &callbacks.fatal {
                                fatal(&error);
                            }
                        });
                        return;
                    }

                    let delay = config.retry.delay(retries);
                    retries += 1;
                    tracing::warn!(
                        error = %cause,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    this.set_state(generation, RequestState::RetryWait);
                    if !Self::sleep(&token, delay).await {
                        return;
                    }
                }
                Step::Fatal(error) => {
                    tracing::error!(error = %error, "Request fatal");
                    this.finish(&token, generation, RequestState::Fatal, || {
                        if let Some(fatal) = &callbacks.fatal {
                            fatal(&error);
                        }
                    });
                    return;
                }
            }
        }
    }
}
