//! In-process stand-in for the Jotty REST API.

#![allow(dead_code)]

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use jotty_hub::config::{Config, TimeoutConfig};
use jotty_hub::integrations::jotty::JottyClient;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const API_KEY: &str = "ck_test";

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub api_key: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Value>,
}

#[derive(Clone)]
struct Canned {
    status: u16,
    body: String,
    delay: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(String, String), Canned>>,
    requests: Mutex<Vec<Recorded>>,
}

pub struct MockJotty {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockJotty {
    /// Starts a server with healthy defaults: two notes, one checklist and
    /// one task under "Home Assistant", plus one foreign note.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        let mock = MockJotty {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        };
        mock.seed_defaults();
        mock
    }

    fn seed_defaults(&self) {
        self.respond_json("GET", "/api/health", 200, json!({ "status": "ok" }));
        self.respond_json(
            "GET",
            "/api/summary",
            200,
            json!({ "summary": { "totalNotes": 3, "totalChecklists": 1 } }),
        );
        self.respond_json(
            "GET",
            "/api/notes",
            200,
            json!({ "notes": [
                { "id": "n1", "title": "Groceries", "content": "milk", "category": "Home Assistant" },
                { "id": "n2", "title": "Garage", "category": "Home Assistant/Sub" },
                { "id": "n3", "title": "Roadmap", "category": "Work" }
            ]}),
        );
        self.respond_json(
            "GET",
            "/api/checklists",
            200,
            json!({ "checklists": [{
                "id": "c1",
                "title": "Packing",
                "category": "Home Assistant",
                "type": "simple",
                "items": [
                    { "text": "Bag", "completed": true, "children": [
                        { "text": "Charger", "completed": false }
                    ]},
                    { "text": "Tickets", "completed": false }
                ]
            }]}),
        );
        self.respond_json(
            "GET",
            "/api/tasks",
            200,
            json!({ "tasks": [{
                "id": "t1",
                "title": "Chores",
                "category": "Home Assistant",
                "items": [
                    { "text": "Dishes", "status": "completed" },
                    { "text": "Laundry", "status": "in_progress" }
                ]
            }]}),
        );
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond(&self, method: &str, path: &str, status: u16, body: &str) {
        self.insert(method, path, Canned {
            status,
            body: body.to_string(),
            delay: None,
        });
    }

    pub fn respond_json(&self, method: &str, path: &str, status: u16, body: Value) {
        self.respond(method, path, status, &body.to_string());
    }

    pub fn respond_slowly(&self, method: &str, path: &str, delay: Duration) {
        self.insert(method, path, Canned {
            status: 200,
            body: "{}".to_string(),
            delay: Some(delay),
        });
    }

    fn insert(&self, method: &str, path: &str, canned: Canned) {
        self.state
            .routes
            .lock()
            .expect("routes lock")
            .insert((method.to_string(), path.to_string()), canned);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().expect("requests lock").clone()
    }

    /// Recorded requests for one route.
    pub fn calls_to(&self, method: &str, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn client(&self) -> JottyClient {
        JottyClient::new(&self.url(), API_KEY, fast_timeouts()).expect("client")
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.connection.url = self.url();
        config.connection.api_key = API_KEY.to_string();
        config.timeouts = fast_timeouts();
        config.data.state_dir = temp_state_dir();
        config
    }
}

impl Drop for MockJotty {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        request_seconds: 1,
        fetch_seconds: 1,
        health_seconds: 1,
    }
}

pub fn temp_state_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("jotty-hub-it-{}-{}", std::process::id(), stamp));
    dir
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().expect("requests lock").push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        api_key: header("x-api-key"),
        content_type: header("content-type"),
        body: serde_json::from_slice(&body).ok(),
    });

    let canned = state
        .routes
        .lock()
        .expect("routes lock")
        .get(&(method.to_string(), uri.path().to_string()))
        .cloned();
    let Some(canned) = canned else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    if let Some(delay) = canned.delay {
        tokio::time::sleep(delay).await;
    }
    let status = StatusCode::from_u16(canned.status).expect("valid status");
    (status, canned.body).into_response()
}
