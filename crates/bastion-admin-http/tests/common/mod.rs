//! Stub admin API server for HTTP contract tests
//!
//! An axum router serving canned responses per (method, path) that records
//! every request it sees. Unknown routes and methods answer 404.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use bastion_core::Secret;
use bastion_core::config::AdminSettings;
use tokio::net::TcpListener;

/// One request as seen by the stub
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

type Routes = HashMap<(String, String), (u16, String)>;

#[derive(Clone)]
struct StubState {
    routes: Arc<Routes>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct StubAdminServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubAdminServer {
    /// Start serving `routes` on an ephemeral local port
    pub async fn start(routes: &[(&str, &str, u16, &str)]) -> Self {
        let state = StubState {
            routes: Arc::new(
                routes
                    .iter()
                    .map(|(method, path, status, body)| {
                        (
                            (method.to_string(), path.to_string()),
                            (*status, body.to_string()),
                        )
                    })
                    .collect(),
            ),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let mut by_path: HashMap<&str, MethodRouter<StubState>> = HashMap::new();
        for (method, path, _, _) in routes {
            let method = Method::from_bytes(method.as_bytes()).unwrap();
            let filter = MethodFilter::try_from(method).unwrap();
            let methods = by_path.remove(path).unwrap_or_else(MethodRouter::new);
            by_path.insert(*path, methods.on(filter, respond));
        }

        let mut app = Router::new();
        for (path, methods) in by_path {
            app = app.route(path, methods.fallback(respond));
        }
        let app = app.fallback(respond).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            requests: state.requests,
        }
    }

    /// Standard happy-path routes of a freshly started proxy
    pub async fn ready() -> Self {
        Self::start(&[
            ("GET", "/api/", 200, r#"{"status":"OK"}"#),
            ("POST", "/api/tokens", 200, r#"{"token":"bearer-abc","expires":"2099-01-01"}"#),
            ("PUT", "/api/users/1", 200, r#"{"id":1,"email":"a@b.com"}"#),
        ])
        .await
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn settings(&self) -> AdminSettings {
        AdminSettings {
            api_url: self.url(),
            email: "a@b.com".to_string(),
            password: Secret::new("secret123"),
            name: "Administrator".to_string(),
            nickname: "Admin".to_string(),
            bootstrap_identity: "admin@example.com".to_string(),
            bootstrap_secret: Secret::new("changeme"),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn respond(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let key = (method.to_string(), uri.path().to_string());

    state.requests.lock().unwrap().push(RecordedRequest {
        method: key.0.clone(),
        path: key.1.clone(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body,
    });

    let (status, body) = state
        .routes
        .get(&key)
        .cloned()
        .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));

    (
        StatusCode::from_u16(status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
