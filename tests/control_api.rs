//! HTTP control router tests.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use vaultsync::config::{SyncSettings, VaultConfig};
use vaultsync::control::{build_router, ConnectorFactory, ControlState};
use vaultsync::store::{MemoryStore, StoreConnector};
use vaultsync::SecretPayload;

/// Resolves request addresses to in-memory stores.
struct MemoryConnectors {
    stores: HashMap<String, Arc<MemoryStore>>,
}

impl ConnectorFactory for MemoryConnectors {
    fn connector(&self, config: &VaultConfig) -> Box<dyn StoreConnector> {
        let store = self
            .stores
            .get(&config.address)
            .cloned()
            .unwrap_or_else(|| Arc::new(MemoryStore::flat("secret")));
        Box::new(store)
    }
}

fn payload(value: Value) -> SecretPayload {
    value.as_object().cloned().unwrap()
}

struct TestApp {
    state: ControlState,
    source: Arc<MemoryStore>,
    destination: Arc<MemoryStore>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    fn new(destination: MemoryStore) -> Self {
        let source = MemoryStore::flat("secret")
            .with_secret("a/x", payload(json!({"k": 1})))
            .with_secret("a/y", payload(json!({"k": 2})));
        Self::with_source(source, destination)
    }

    fn with_source(source: MemoryStore, destination: MemoryStore) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(source);
        let destination = Arc::new(destination);

        let stores = HashMap::from([
            ("http://source:8200".to_string(), Arc::clone(&source)),
            ("http://destination:8200".to_string(), Arc::clone(&destination)),
        ]);
        let defaults = SyncSettings {
            workers: 2,
            list_output_file: dir.path().join("list.out"),
            ..Default::default()
        };
        let state = ControlState::with_connectors(defaults, Arc::new(MemoryConnectors { stores }));

        Self { state, source, destination, _dir: dir }
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

fn action_body() -> Value {
    json!({
        "source": {"address": "http://source:8200", "token": "s"},
        "destination": {"address": "http://destination:8200", "token": "d"}
    })
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(MemoryStore::flat("secret"));
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["busy"], false);
}

#[tokio::test]
async fn test_copy_returns_summary() {
    let app = TestApp::new(MemoryStore::flat("secret"));

    let response = app.router().oneshot(post("/api/v1/copy", &action_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["action"], "copy");
    assert_eq!(body["planned"], 2);
    assert_eq!(body["report"]["outcomes"][0]["status"], "copied");
    assert_eq!(app.destination.keys().await, vec!["a/x", "a/y"]);
}

#[tokio::test]
async fn test_partial_failure_is_multi_status() {
    let app = TestApp::new(MemoryStore::flat("secret").fail_writes_for("a/y"));

    let response = app.router().oneshot(post("/api/v1/copy", &action_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let body: Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["report"]["outcomes"][1]["path"], "secret/a/y");
    assert_eq!(body["report"]["outcomes"][1]["status"], "failed");
}

#[tokio::test]
async fn test_mirror_lists_delete_candidates() {
    let app = TestApp::new(MemoryStore::flat("secret").with_secret("old", payload(json!({}))));

    let response = app.router().oneshot(post("/api/v1/mirror", &action_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["delete_candidates"], json!(["secret/old"]));
}

#[tokio::test]
async fn test_list_returns_snapshot_text() {
    let app = TestApp::new(MemoryStore::flat("secret"));
    let body = json!({"source": {"address": "http://source:8200", "token": "s"}});

    let response = app.router().oneshot(post("/api/v1/list", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
    let text = String::from_utf8(read_body(response).await).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.sort_unstable();
    assert_eq!(lines, vec!["secret/a/x {\"k\":1}", "secret/a/y {\"k\":2}"]);
    assert_eq!(app.source.write_count(), 0);
}

#[tokio::test]
async fn test_list_with_failed_reads_is_multi_status() {
    let app = TestApp::with_source(
        MemoryStore::flat("secret")
            .with_secret("a/x", payload(json!({"k": 1})))
            .with_secret("a/y", payload(json!({"k": 2})))
            .fail_reads_for("a/y"),
        MemoryStore::flat("secret"),
    );
    let body = json!({"source": {"address": "http://source:8200", "token": "s"}});

    let response = app.router().oneshot(post("/api/v1/list", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let text = String::from_utf8(read_body(response).await).unwrap();
    assert_eq!(text, "secret/a/x {\"k\":1}\n");
}

#[tokio::test]
async fn test_busy_while_action_running() {
    let app = TestApp::new(MemoryStore::flat("secret"));
    let _permit = app.state.guard.try_acquire().unwrap();

    let response = app.router().oneshot(post("/api/v1/copy", &action_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["error"], "busy");
    assert_eq!(app.source.read_count(), 0);
}

#[tokio::test]
async fn test_guard_released_after_failed_action() {
    let app = TestApp::new(MemoryStore::flat("secret"));
    let body = json!({"source": {"address": "http://source:8200", "token": "s"}});

    let response = app.router().oneshot(post("/api/v1/copy", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(!app.state.guard.is_busy());
    let response = app.router().oneshot(post("/api/v1/copy", &action_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dialect_mismatch_is_unprocessable() {
    let app = TestApp::new(MemoryStore::versioned("secret"));

    let response = app.router().oneshot(post("/api/v1/copy", &action_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.destination.write_count(), 0);
}
