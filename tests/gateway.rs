use std::sync::Arc;
use std::time::{Duration, Instant};

use estate_client::config::ApiConfig;
use estate_client::gateway::OverflowMode;
use estate_client::storage::{MemoryStore, Store, AUTH_TOKEN_KEY};
use estate_client::{ApiClient, CallOptions, RateLimitConfig};
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_json, header, header_exists, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn api(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
    }
}

fn limits(max_requests: u32, window: Duration, mode: OverflowMode) -> RateLimitConfig {
    RateLimitConfig {
        window,
        max_requests,
        mode,
        max_queued: 10,
    }
}

#[tokio::test]
async fn test_attaches_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wills/12"))
        .and(header("Authorization", "Bearer token-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 12, "status": "draft"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    store.set(AUTH_TOKEN_KEY, "token-abc").await.unwrap();
    let client = ApiClient::new(&api(&server.uri()), RateLimitConfig::default(), Arc::new(store)).unwrap();

    let response = client.call::<Value>("/wills/12", CallOptions::get()).await;
    assert!(response.is_ok());
    assert_eq!(response.status, Some(200));
    assert_eq!(response.data.unwrap()["status"], "draft");
}

#[tokio::test]
async fn test_unauthenticated_call_omits_token() {
    let server = MockServer::start().await;
    Mock::given(path("/auth/login"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "ann@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    store.set(AUTH_TOKEN_KEY, "stale").await.unwrap();
    let client = ApiClient::new(&api(&server.uri()), RateLimitConfig::default(), Arc::new(store)).unwrap();

    let options = CallOptions::post(json!({"email": "ann@example.com"})).unauthenticated();
    let response = client.call::<Value>("auth/login", options).await;
    assert_eq!(response.data, Some(json!({"ok": true})));
}

#[tokio::test]
async fn test_error_status_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(path("/wills/99"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "ERROR_CODE_NOT_FOUND",
            "message": "Will not found"
        })))
        .mount(&server)
        .await;
    Mock::given(path("/vault"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad gateway</html>"))
        .mount(&server)
        .await;

    let client = ApiClient::new(&api(&server.uri()), RateLimitConfig::default(), Arc::new(MemoryStore::new())).unwrap();

    let response = client.call::<Value>("wills/99", CallOptions::get()).await;
    assert_eq!(response.data, None);
    assert_eq!(response.error.as_deref(), Some("Will not found"));
    assert_eq!(response.status, Some(404));

    let response = client.call::<Value>("vault", CallOptions::get()).await;
    assert_eq!(response.error.as_deref(), Some("Request failed with status 502"));

    let err = client.call_strict::<Value>("wills/99", CallOptions::get()).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_empty_body_and_decode_errors() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/vault/3"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(path("/relationships"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let client = ApiClient::new(&api(&server.uri()), RateLimitConfig::default(), Arc::new(MemoryStore::new())).unwrap();

    let deleted = client.call::<Option<Value>>("vault/3", CallOptions::delete()).await;
    assert_eq!(deleted.data, Some(None));
    assert_eq!(deleted.status, Some(204));

    let wrong_shape = client.call::<Vec<Value>>("relationships", CallOptions::get()).await;
    assert!(wrong_shape.error.unwrap().starts_with("Invalid response body"));
}

#[tokio::test]
async fn test_network_failure_becomes_error_string() {
    let client = ApiClient::new(&api("http://127.0.0.1:9"), RateLimitConfig::default(), Arc::new(MemoryStore::new())).unwrap();

    let response = client.call::<Value>("auth/me", CallOptions::get()).await;
    assert!(response.error.unwrap().starts_with("Network error"));
    assert_eq!(response.status, None);
    assert_eq!(response.data, None);
}

#[test_log::test(tokio::test)]
async fn test_reject_mode_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(path("/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let client = ApiClient::new(
        &api(&server.uri()),
        limits(2, Duration::from_secs(60), OverflowMode::Reject),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    assert!(client.call::<Value>("auth/me", CallOptions::get()).await.is_ok());
    assert!(client.call::<Value>("auth/me", CallOptions::get()).await.is_ok());

    let limited = client.call::<Value>("auth/me", CallOptions::get()).await;
    assert_eq!(limited.error.as_deref(), Some("Too many requests. Please wait a moment and try again."));
    assert_eq!(limited.status, Some(429));
    assert!(client.rate_limit_state().await.limited);
}

#[test_log::test(tokio::test)]
async fn test_queue_mode_defers_until_window_opens() {
    let server = MockServer::start().await;
    Mock::given(path("/relationships"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(5)
        .mount(&server)
        .await;

    let window = Duration::from_millis(300);
    let client = Arc::new(
        ApiClient::new(
            &api(&server.uri()),
            limits(2, window, OverflowMode::Queue),
            Arc::new(MemoryStore::new()),
        )
        .unwrap(),
    );

    let started = Instant::now();
    let calls = (0..5).map(|_| {
        let client = client.clone();
        async move { client.call::<Vec<Value>>("relationships", CallOptions::get()).await }
    });
    let responses = futures::future::join_all(calls).await;

    assert!(responses.iter().all(|r| r.is_ok()));
    // five calls at two per window need two extra windows
    assert!(started.elapsed() >= window * 2);
    assert_eq!(client.rate_limit_state().await.queued, 0);
}
