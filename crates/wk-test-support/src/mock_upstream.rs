//! A mock RefStream/ESI HTTP upstream for testing `wk-fetch`/`wk-enrich`/
//! `services/poller` against the wire shapes of spec §6, without a real
//! network dependency.
//!
//! Binds to `127.0.0.1:0` and spawns an accept loop the same way the
//! teacher's `MockWsServer` does for WebSocket connections; each test gets
//! its own isolated instance.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

#[derive(Default)]
struct MockState {
    /// Packages returned by `/listen.php`, one per call, in order. Once
    /// drained, subsequent calls return `{"package": null}`.
    queue: VecDeque<Value>,
    /// Static JSON bodies keyed by path, for ESI-shaped lookup endpoints.
    responses: HashMap<String, Value>,
    /// Per-path queue of HTTP status codes to return before falling back to
    /// `responses` (used to script rate-limit/5xx/recovery sequences).
    status_sequences: HashMap<String, VecDeque<u16>>,
    /// Observed call counts per path, for coalescing/dedup assertions.
    counts: HashMap<String, usize>,
    /// Bodies posted to any path (webhook delivery capture), most recent last.
    posted_bodies: HashMap<String, Vec<Value>>,
}

#[derive(Clone)]
pub struct MockUpstream {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    _task: Arc<tokio::task::JoinHandle<()>>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(MockState::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock upstream failed to bind");
        let addr = listener.local_addr().expect("mock upstream has no local addr");

        let app = Router::new()
            .route("/listen.php", get(listen_handler))
            .route("/*path", get(lookup_handler).post(webhook_handler))
            .with_state(state.clone());

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("mock upstream server error");
        });

        Self {
            addr,
            state,
            _task: Arc::new(task),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Enqueue one RefStream package to be returned by the next `/listen.php`
    /// poll.
    pub fn push_package(&self, package: Value) {
        self.state.lock().unwrap().queue.push_back(package);
    }

    /// Register the static JSON body returned for `path` (e.g.
    /// `"killmails/123/abc/"`, `"characters/95465499/"`).
    pub fn set_response(&self, path: &str, body: Value) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(normalize_path(path), body);
    }

    /// Script a sequence of HTTP status codes for `path`; each call consumes
    /// one. Once drained, calls fall through to the registered response (or
    /// 404 if none is set).
    pub fn set_status_sequence(&self, path: &str, codes: Vec<u16>) {
        self.state
            .lock()
            .unwrap()
            .status_sequences
            .insert(normalize_path(path), codes.into_iter().collect());
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .counts
            .get(&normalize_path(path))
            .copied()
            .unwrap_or(0)
    }

    /// Bodies POSTed to `path` so far, in arrival order (webhook delivery
    /// assertions).
    pub fn posted_bodies(&self, path: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .posted_bodies
            .get(&normalize_path(path))
            .cloned()
            .unwrap_or_default()
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').to_owned()
}

async fn listen_handler(
    State(state): State<Arc<Mutex<MockState>>>,
    Query(_params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mut state = state.lock().unwrap();
    *state.counts.entry("listen.php".to_owned()).or_insert(0) += 1;
    let package = state.queue.pop_front();
    Json(serde_json::json!({ "package": package }))
}

async fn lookup_handler(
    axum::extract::Path(path): axum::extract::Path<String>,
    State(state): State<Arc<Mutex<MockState>>>,
) -> axum::response::Response {
    let path = normalize_path(&path);
    let mut state = state.lock().unwrap();
    *state.counts.entry(path.clone()).or_insert(0) += 1;

    if let Some(codes) = state.status_sequences.get_mut(&path) {
        if let Some(code) = codes.pop_front() {
            if code >= 400 {
                let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                return (status, Json(serde_json::json!({"error": "scripted failure"}))).into_response();
            }
        }
    }

    match state.responses.get(&path) {
        Some(body) => Json(body.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "not found"}))).into_response(),
    }
}

/// Accepts any JSON POST (webhook deliveries) and records the body, so tests
/// can assert on what `WebhookNotifier` actually sent without standing up a
/// second server.
async fn webhook_handler(
    axum::extract::Path(path): axum::extract::Path<String>,
    State(state): State<Arc<Mutex<MockState>>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let path = normalize_path(&path);
    let mut state = state.lock().unwrap();
    *state.counts.entry(path.clone()).or_insert(0) += 1;
    state.posted_bodies.entry(path).or_default().push(body);
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn listen_endpoint_drains_queued_packages_then_returns_none() {
        let upstream = MockUpstream::start().await;
        upstream.push_package(fixtures::new_format_package(1, 30000142, "2024-01-01T12:00:00Z"));

        let client = reqwest::Client::new();
        let url = format!("{}/listen.php?queueID=abc&ttw=1", upstream.base_url());

        let first: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
        assert!(first["package"].is_object());

        let second: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
        assert!(second["package"].is_null());

        assert_eq!(upstream.call_count("listen.php"), 2);
    }

    #[tokio::test]
    async fn lookup_endpoint_serves_registered_response() {
        let upstream = MockUpstream::start().await;
        upstream.set_response("characters/1/", fixtures::named_entity("Some Pilot"));

        let client = reqwest::Client::new();
        let url = format!("{}/characters/1/", upstream.base_url());
        let body: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
        assert_eq!(body["name"], "Some Pilot");
    }

    #[tokio::test]
    async fn status_sequence_is_consumed_in_order() {
        let upstream = MockUpstream::start().await;
        upstream.set_status_sequence("systemID/1/", vec![429, 429, 500]);
        upstream.set_response("systemID/1/", serde_json::json!([]));

        let client = reqwest::Client::new();
        let url = format!("{}/systemID/1/", upstream.base_url());

        let r1 = client.get(&url).send().await.unwrap();
        assert_eq!(r1.status().as_u16(), 429);
        let r2 = client.get(&url).send().await.unwrap();
        assert_eq!(r2.status().as_u16(), 429);
        let r3 = client.get(&url).send().await.unwrap();
        assert_eq!(r3.status().as_u16(), 500);
        let r4 = client.get(&url).send().await.unwrap();
        assert_eq!(r4.status().as_u16(), 200);
    }
}
