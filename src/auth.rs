//! Access tokens and their periodic refresh.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::request::{BuildError, FatalError, Request, RequestBuilder, RequestHandle, RequestState};
use crate::schema::{FieldSchema, Schema, SchemaDict};
use crate::transport::{RequestParams, Transport, TransportResponse};

pub const TOKEN_REFRESH_SCHEMA: &str = "tokenRefreshResponse";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

/// Supplies the current tokens at attempt time.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Token;
}

/// Shared, thread-safe token holder.
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<Token>,
}

impl TokenStore {
    pub fn new(token: Token) -> Self {
        Self {
            inner: RwLock::new(token),
        }
    }

    pub fn set(&self, token: Token) {
        *self.inner.write() = token;
    }

    pub fn set_access(&self, access: impl Into<String>) {
        self.inner.write().access = Some(access.into());
    }

    pub fn clear(&self) {
        *self.inner.write() = Token::default();
    }
}

impl TokenSource for TokenStore {
    fn token(&self) -> Token {
        self.inner.read().clone()
    }
}

/// Shape check for refresh responses.
pub fn token_refresh_schema() -> SchemaDict {
    let mut dict = SchemaDict::new();
    let mut schema = Schema::default();
    schema
        .fields
        .insert("access".to_string(), FieldSchema::required("string"));
    dict.put(TOKEN_REFRESH_SCHEMA, schema);
    dict
}

/// Keeps the access token fresh by re-posting the refresh token on a timer.
///
/// Each successful refresh stores the new access token and schedules the
/// next one `refresh_time` later.
pub struct TokenRefresher {
    request: Request,
    scheduler: Arc<Scheduler>,
}

struct Scheduler {
    refresh_time: Duration,
    scheduled: Mutex<Option<JoinHandle<()>>>,
    request: OnceLock<RequestHandle>,
}

impl TokenRefresher {
    pub fn new<T: Transport + 'static>(
        transport: T,
        url: impl Into<String>,
        store: Arc<TokenStore>,
        refresh_time: Duration,
    ) -> Result<Self, BuildError> {
        let scheduler = Arc::new(Scheduler {
            refresh_time,
            scheduled: Mutex::new(None),
            request: OnceLock::new(),
        });

        let params_store = store.clone();
        let on_success = scheduler.clone();
        let request = RequestBuilder::new(transport)
            .url(url.into())
            .params(move || {
                let Token { refresh, access } = params_store.token();
                RequestParams::post(json!({ "refresh": refresh, "access": access }))
            })
            .schema(TOKEN_REFRESH_SCHEMA)
            .validator(Arc::new(token_refresh_schema()))
            .decay(0.3)
            .initial_retry_time(Duration::from_millis(500))
            .max_retry_time(Duration::from_secs(2))
            .max_retry_attempts(10)
            .success(move |response| {
                if let Some(access) = response.get("access").and_then(|a| a.as_str()) {
                    store.set_access(access);
                    tracing::info!("Access token refreshed");
                }
                Scheduler::schedule(&on_success);
            })
            .failure(|response: &TransportResponse| {
                tracing::info!(status = response.status, body = %response.body, "Token refresh failed");
            })
            .fatal(|error: &FatalError| {
                tracing::info!(error = %error, "Token refresh fatal");
            })
            .build()?;

        if scheduler.request.set(request.handle()).is_err() {
            tracing::warn!("Token refresh handle was already installed");
        }
        Ok(Self { request, scheduler })
    }

    pub fn from_config<T: Transport + 'static>(
        transport: T,
        config: &Config,
        store: Arc<TokenStore>,
    ) -> Result<Self, BuildError> {
        let url = format!(
            "{}{}",
            config.api.endpoint.trim_end_matches('/'),
            config.auth.refresh_path
        );
        Self::new(
            transport,
            url,
            store,
            Duration::from_secs(config.auth.refresh_seconds),
        )
    }

    /// Schedules a refresh after `refresh_time`.
    pub fn schedule(&self) {
        Scheduler::schedule(&self.scheduler);
    }

    /// Refreshes right away.
    pub fn refresh_now(&self) {
        self.request.start();
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduler
            .scheduled
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn state(&self) -> RequestState {
        self.request.state()
    }

    /// Cancels the pending schedule and any refresh in progress.
    pub fn stop(&self) {
        if let Some(handle) = self.scheduler.scheduled.lock().take() {
            handle.abort();
        }
        self.request.stop();
    }
}

impl Scheduler {
    fn schedule(this: &Arc<Self>) {
        let mut scheduled = this.scheduled.lock();
        if scheduled.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::warn!("Refresh is already scheduled");
            return;
        }
        let scheduler = this.clone();
        *scheduled = Some(tokio::spawn(async move {
            tokio::time::sleep(scheduler.refresh_time).await;
            scheduler.scheduled.lock().take();
            if let Some(request) = scheduler.request.get() {
                request.start();
            }
        }));
    }
}

impl Drop for TokenRefresher {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.scheduled.lock().take() {
            handle.abort();
        }
    }
}
