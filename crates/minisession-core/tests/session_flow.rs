//! End-to-end session tests over `ReqwestBackend` against a wiremock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use minisession_core::api::{ApiError, RequestSpec, UploadSpec};
use minisession_core::auth::{
    JsonFileStore, KeyValueStore, MemoryStore, SessionManager, SessionState, StaticPlatform,
    TOKEN_KEY,
};
use minisession_core::config::{Config, LoginConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(server: &MockServer) -> Config {
    Config::new(server.uri(), LoginConfig::new("/login"))
}

fn platform(code: &str) -> Arc<StaticPlatform> {
    Arc::new(StaticPlatform::new(Some(code.to_string())))
}

fn login_response(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"code": 0, "data": {"token": token}}))
}

async fn mount_login(server: &MockServer, code: &str, token: &str) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .and(query_param("code", code))
        .respond_with(login_response(token))
        .mount(server)
        .await;
}

async fn hits(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

// ---------------------------------------------------------------------------
// Login exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cold_start_login_persists_token_and_calls_back_once() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", "T1").await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().to_path_buf()));
    let session =
        SessionManager::with_reqwest(config(&server), platform("abc"), store.clone()).unwrap();
    assert_eq!(session.state(), SessionState::NoCredential);

    let calls = AtomicUsize::new(0);
    session
        .ensure_session_with(|| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("T1"));
    assert_eq!(session.state(), SessionState::Authenticated);

    let requests = server.received_requests().await.unwrap();
    let login = &requests[0];
    assert_eq!(
        login.headers.get("content-type").unwrap(),
        "application/x-www-form-urlencoded"
    );
    assert_eq!(login.headers.get("token").unwrap(), "");
}

#[tokio::test]
async fn test_warm_start_reuses_persisted_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("token", "T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "li"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    JsonFileStore::new(dir.path().to_path_buf())
        .set(TOKEN_KEY, "T1")
        .unwrap();

    let store = Arc::new(JsonFileStore::new(dir.path().to_path_buf()));
    let session =
        SessionManager::with_reqwest(config(&server), platform("unused"), store).unwrap();

    let body = session
        .request_authenticated(&RequestSpec::new("/profile"))
        .await
        .unwrap();
    assert_eq!(body, json!({"name": "li"}));
    assert_eq!(hits(&server, "/login").await, 0);
}

#[tokio::test]
async fn test_missing_code_leaves_store_untouched() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let session = SessionManager::with_reqwest(
        config(&server),
        Arc::new(StaticPlatform::new(None)),
        store.clone(),
    )
    .unwrap();

    let calls = AtomicUsize::new(0);
    let result = session
        .ensure_session_with(|| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.get(TOKEN_KEY).unwrap(), None);
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Authenticated requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_expired_token_is_replaced_and_request_retried() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", "T2").await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("token", "T1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("token", "T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"orders": [{"id": 1}]})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(TOKEN_KEY, "T1").unwrap();
    let session =
        SessionManager::with_reqwest(config(&server), platform("abc"), store.clone()).unwrap();

    let body = session
        .request_authenticated(&RequestSpec::new("/orders"))
        .await
        .unwrap();

    assert_eq!(body, json!({"orders": [{"id": 1}]}));
    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("T2"));
    server.verify().await;
}

#[tokio::test]
async fn test_second_rejection_is_surfaced_after_two_attempts() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", "T2").await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(TOKEN_KEY, "T1").unwrap();
    let session = SessionManager::with_reqwest(config(&server), platform("abc"), store).unwrap();

    let err = session
        .request_authenticated(&RequestSpec::new("/orders"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized));
    assert_eq!(hits(&server, "/orders").await, 2);
    assert_eq!(hits(&server, "/login").await, 1);
}

#[tokio::test]
async fn test_absolute_url_bypasses_api_host() {
    let api = MockServer::start().await;
    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"up": true})))
        .expect(1)
        .mount(&other)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(TOKEN_KEY, "T1").unwrap();
    let session = SessionManager::with_reqwest(config(&api), platform("abc"), store).unwrap();

    let url = format!("{}/status", other.uri());
    let body = session
        .request_authenticated(&RequestSpec::new(url))
        .await
        .unwrap();

    assert_eq!(body, json!({"up": true}));
    assert!(api.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"sku": "A-1", "qty": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(TOKEN_KEY, "T1").unwrap();
    let session = SessionManager::with_reqwest(config(&server), platform("abc"), store).unwrap();

    let spec = RequestSpec::post("/orders").field("sku", "A-1").field("qty", 2);
    let body = session.request_authenticated(&spec).await.unwrap();
    assert_eq!(body, json!({"id": 42}));
}

#[tokio::test]
async fn test_server_error_is_not_retried_with_credential() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(TOKEN_KEY, "T1").unwrap();
    let session = SessionManager::with_reqwest(config(&server), platform("abc"), store).unwrap();

    let err = session
        .request_authenticated(&RequestSpec::new("/orders"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(hits(&server, "/orders").await, 1);
    assert_eq!(hits(&server, "/login").await, 0);
}

#[tokio::test]
async fn test_rate_limit_is_surfaced_without_retry_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 1})))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(TOKEN_KEY, "T1").unwrap();
    let session = SessionManager::with_reqwest(config(&server), platform("abc"), store).unwrap();

    let err = session
        .request_authenticated(&RequestSpec::new("/orders"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::RateLimited));
    assert_eq!(hits(&server, "/orders").await, 1);
    assert_eq!(hits(&server, "/login").await, 0);
}

#[tokio::test]
async fn test_upload_sends_multipart_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("token", "T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "/f/1"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("photo.txt");
    std::fs::write(&file, "file-contents").unwrap();

    let store = Arc::new(MemoryStore::new());
    store.set(TOKEN_KEY, "T1").unwrap();
    let session = SessionManager::with_reqwest(config(&server), platform("abc"), store).unwrap();

    let spec = UploadSpec::new("/upload", &file, "file").field("album", "trip");
    let body = session.upload_authenticated(&spec).await.unwrap();
    assert_eq!(body, json!({"url": "/f/1"}));

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let raw = String::from_utf8_lossy(&requests[0].body);
    assert!(raw.contains("file-contents"));
    assert!(raw.contains("name=\"album\""));
    assert!(raw.contains("trip"));
}
