//! Scripted HTTP stub standing in for a backend.
//!
//! Every request is recorded; responses come from a per-route queue where
//! the last entry repeats once the queue is drained.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use reqwest::Url;
use retouch_backend::{connect, BackendAdapter, BackendConfig, BackendKind};
use tokio::net::TcpListener;

/// One request as seen by the stub.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

type Script = HashMap<String, VecDeque<(StatusCode, String)>>;

#[derive(Clone, Default)]
struct StubState {
    script: Arc<Mutex<Script>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

pub struct StubServer {
    addr: std::net::SocketAddr,
    state: StubState,
}

impl StubServer {
    /// Bind to an ephemeral port and serve until the test runtime ends.
    pub async fn start() -> Self {
        let state = StubState::default();
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Base URL with an optional path prefix, e.g. `/v2/endpoint`.
    pub fn url(&self, prefix: &str) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, prefix)).unwrap()
    }

    /// Queue a JSON response for `METHOD path`.
    pub fn respond(&self, method: &str, path: &str, status: u16, body: serde_json::Value) {
        self.respond_text(method, path, status, &body.to_string());
    }

    pub fn respond_text(&self, method: &str, path: &str, status: u16, body: &str) {
        self.state
            .script
            .lock()
            .unwrap()
            .entry(format!("{method} {path}"))
            .or_default()
            .push_back((StatusCode::from_u16(status).unwrap(), body.to_string()));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Requests whose path matches exactly.
    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    /// Adapter of `kind` pointed at this stub.
    pub fn adapter(&self, kind: BackendKind, prefix: &str) -> Arc<dyn BackendAdapter> {
        connect(&self.config(kind, prefix)).unwrap()
    }

    pub fn config(&self, kind: BackendKind, prefix: &str) -> BackendConfig {
        let mut config = BackendConfig::new(kind, self.url(prefix));
        if kind == BackendKind::Deployment {
            config.deployment_id = Some("dep-123".to_string());
        }
        config
    }
}

async fn handle(State(state): State<StubState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let header = |name: HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let recorded = Recorded {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        authorization: header(AUTHORIZATION),
        content_type: header(CONTENT_TYPE),
        body: to_bytes(body, usize::MAX).await.unwrap().to_vec(),
    };
    let key = format!("{} {}", recorded.method, recorded.path);
    state.requests.lock().unwrap().push(recorded);

    let mut script = state.script.lock().unwrap();
    let Some(queue) = script.get_mut(&key) else {
        return (StatusCode::NOT_FOUND, format!("no stub for {key}")).into_response();
    };
    let (status, body) = if queue.len() > 1 {
        queue.pop_front().unwrap()
    } else {
        queue.front().cloned().unwrap()
    };
    (status, [(CONTENT_TYPE, "application/json")], body).into_response()
}
