mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Reply, ScriptedTransport};
use deeprest::auth::{Token, TokenRefresher, TokenSource, TokenStore};
use deeprest::config::Config;
use deeprest::request::RequestState;
use deeprest::transport::Method;
use serde_json::json;

const REFRESH: Duration = Duration::from_secs(150);

fn store() -> Arc<TokenStore> {
    Arc::new(TokenStore::new(Token {
        access: Some("stale".to_string()),
        refresh: Some("r-1".to_string()),
    }))
}

#[tokio::test(start_paused = true)]
async fn refresh_stores_token_and_reschedules() {
    let transport = ScriptedTransport::new([
        Reply::ok(json!({"access": "fresh-1"})),
        Reply::ok(json!({"access": "fresh-2"})),
    ]);
    let tokens = store();
    let refresher =
        TokenRefresher::new(transport.clone(), "http://test/token/refresh/", tokens.clone(), REFRESH)
            .unwrap();

    refresher.refresh_now();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(refresher.state(), RequestState::Succeeded);
    assert_eq!(tokens.token().access.as_deref(), Some("fresh-1"));
    assert!(refresher.is_scheduled());

    let sent = transport.sent();
    assert_eq!(sent[0].params.method, Method::Post);
    assert_eq!(
        sent[0].params.body,
        Some(json!({"refresh": "r-1", "access": "stale"}))
    );

    tokio::time::sleep(REFRESH).await;
    assert_eq!(transport.calls(), 2);
    assert_eq!(tokens.token().access.as_deref(), Some("fresh-2"));
    assert_eq!(
        transport.sent()[1].params.body,
        Some(json!({"refresh": "r-1", "access": "fresh-1"}))
    );

    refresher.stop();
}

#[tokio::test(start_paused = true)]
async fn malformed_response_is_rejected() {
    let transport = ScriptedTransport::new([Reply::ok(json!({"token": 12}))]);
    let tokens = store();
    let refresher =
        TokenRefresher::new(transport.clone(), "http://test/token/refresh/", tokens.clone(), REFRESH)
            .unwrap();

    refresher.refresh_now();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(refresher.state(), RequestState::Invalid);
    assert_eq!(tokens.token().access.as_deref(), Some("stale"));
    assert!(!refresher.is_scheduled());
}

#[tokio::test(start_paused = true)]
async fn refresh_retries_transient_errors() {
    let transport = ScriptedTransport::new([
        Reply::unavailable(),
        Reply::refused(),
        Reply::ok(json!({"access": "fresh"})),
    ]);
    let tokens = store();
    let refresher =
        TokenRefresher::new(transport.clone(), "http://test/token/refresh/", tokens.clone(), REFRESH)
            .unwrap();

    refresher.refresh_now();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(transport.calls(), 3);
    assert_eq!(tokens.token().access.as_deref(), Some("fresh"));
    refresher.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_pending_refresh() {
    let transport = ScriptedTransport::default();
    let refresher =
        TokenRefresher::new(transport.clone(), "http://test/token/refresh/", store(), REFRESH)
            .unwrap();

    refresher.schedule();
    assert!(refresher.is_scheduled());
    refresher.stop();
    assert!(!refresher.is_scheduled());

    tokio::time::sleep(REFRESH * 2).await;
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn from_config_targets_refresh_path() {
    let transport = ScriptedTransport::new([Reply::ok(json!({"access": "a"}))]);
    let mut config = Config::default();
    config.api.endpoint = "https://api.example.com/api/v1/".to_string();
    let refresher = TokenRefresher::from_config(transport.clone(), &config, store()).unwrap();

    refresher.refresh_now();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        transport.sent()[0].url,
        "https://api.example.com/api/v1/token/refresh/"
    );
    refresher.stop();
}
