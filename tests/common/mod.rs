//! In-process mock Redfish service for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const SESSIONS_URI: &str = "/redfish/v1/SessionService/Sessions";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub auth_token: Option<String>,
    pub authorization: Option<String>,
    pub if_match: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Value>,
    pub raw_body: String,
}

#[derive(Clone, Default)]
pub struct MockState {
    pub resources: Arc<DashMap<String, Value>>,
    pub redirects: Arc<DashMap<String, String>>,
    /// Bodies served verbatim, for malformed-JSON cases.
    pub raw_bodies: Arc<DashMap<String, String>>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    /// Accepted session credentials, `(username, password)`.
    pub credentials: Arc<Mutex<Option<(String, String)>>>,
    /// When set, every non-root GET must carry this token.
    pub required_token: Arc<Mutex<Option<String>>>,
    pub session_token: Arc<Mutex<String>>,
    pub session_omits_token: Arc<Mutex<bool>>,
    pub patch_returns_empty: Arc<Mutex<bool>>,
    pub post_returns_empty: Arc<Mutex<bool>>,
    next_id: Arc<AtomicUsize>,
}

/// A mock service running in the background on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: MockState,
    _handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = MockState::default();
        *state.session_token.lock().unwrap() = "abc123".to_string();
        state.next_id.store(1, Ordering::SeqCst);

        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    /// A server pre-loaded with a service root, a Systems collection and
    /// two systems.
    pub async fn with_fixture() -> Self {
        let server = Self::start().await;
        server.insert(
            "/redfish",
            json!({"v1": "/redfish/v1/"}),
        );
        server.insert(
            "/redfish/v1",
            json!({
                "@odata.id": "/redfish/v1",
                "Id": "RootService",
                "RedfishVersion": "1.6.0",
                "Systems": {"@odata.id": "/redfish/v1/Systems"},
                "SessionService": {"@odata.id": "/redfish/v1/SessionService"},
                "Links": {"Sessions": {"@odata.id": SESSIONS_URI}}
            }),
        );
        server.insert(
            "/redfish/v1/Systems",
            json!({
                "@odata.id": "/redfish/v1/Systems",
                "Name": "Computer System Collection",
                "Members": [
                    {"@odata.id": "/redfish/v1/Systems/1"},
                    {"@odata.id": "/redfish/v1/Systems/2"}
                ],
                "Members@odata.count": 2
            }),
        );
        server.insert(
            "/redfish/v1/Systems/1",
            json!({
                "@odata.id": "/redfish/v1/Systems/1",
                "@odata.etag": "W/\"1\"",
                "Id": "1",
                "PowerState": "On",
                "MemoryGiB": 256,
                "AssetTag": "",
                "Status": {"State": "Enabled", "Health": "OK"},
                "Boot": {"BootSourceOverrideTarget": "None", "AllowedValues": ["Pxe", "Hdd"]}
            }),
        );
        server.insert(
            "/redfish/v1/Systems/2",
            json!({
                "@odata.id": "/redfish/v1/Systems/2",
                "Id": "2",
                "PowerState": "Off",
                "MemoryGiB": 64,
                "Status": {"State": "Disabled", "Health": "Warning"}
            }),
        );
        server.insert(
            SESSIONS_URI,
            json!({"@odata.id": SESSIONS_URI, "Members": [], "Members@odata.count": 0}),
        );
        server
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn insert(&self, path: &str, value: Value) {
        self.state.resources.insert(path.to_string(), value);
    }

    pub fn resource(&self, path: &str) -> Option<Value> {
        self.state.resources.get(path).map(|entry| entry.value().clone())
    }

    pub fn insert_raw(&self, path: &str, body: &str) {
        self.state.raw_bodies.insert(path.to_string(), body.to_string());
    }

    pub fn redirect(&self, from: &str, to: &str) {
        self.state.redirects.insert(from.to_string(), to.to_string());
    }

    pub fn accept_credentials(&self, username: &str, password: &str) {
        *self.state.credentials.lock().unwrap() = Some((username.to_string(), password.to_string()));
    }

    pub fn require_token(&self, token: &str) {
        *self.state.required_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn json_response(status: StatusCode, value: &Value) -> Response {
    let mut response = (status, value.to_string()).into_response();
    response
        .headers_mut()
        .insert("Content-Type", HeaderValue::from_static("application/json"));
    response
}

fn with_location(mut response: Response, location: &str) -> Response {
    response
        .headers_mut()
        .insert("Location", HeaderValue::from_str(location).unwrap());
    response
}

async fn handle(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let raw_body = String::from_utf8_lossy(&body).into_owned();
    let body: Option<Value> = serde_json::from_slice(&body).ok();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        auth_token: header(&headers, "X-Auth-Token"),
        authorization: header(&headers, "Authorization"),
        if_match: header(&headers, "If-Match"),
        content_type: header(&headers, "Content-Type"),
        body: body.clone(),
        raw_body,
    });

    if let Some(target) = state.redirects.get(&path) {
        return with_location(StatusCode::FOUND.into_response(), target.value());
    }

    let required = state.required_token.lock().unwrap().clone();
    let is_public = path == "/redfish" || path == "/redfish/v1" || path == SESSIONS_URI;
    if let Some(required) = required {
        if !is_public && header(&headers, "X-Auth-Token").as_deref() != Some(required.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    match method {
        Method::GET if state.raw_bodies.contains_key(&path) => {
            let body = state
                .raw_bodies
                .get(&path)
                .map(|entry| entry.value().clone())
                .unwrap_or_default();
            (StatusCode::OK, body).into_response()
        }
        Method::GET => match state.resources.get(&path) {
            Some(resource) => json_response(StatusCode::OK, resource.value()),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Method::POST if path == SESSIONS_URI => create_session(&state, body),
        Method::POST => create_member(&state, &path, body),
        Method::PATCH => {
            let Some(mut resource) = state.resources.get_mut(&path) else {
                return StatusCode::NOT_FOUND.into_response();
            };
            if let (Value::Object(target), Some(Value::Object(changes))) =
                (resource.value_mut(), body)
            {
                for (key, value) in changes {
                    target.insert(key, value);
                }
            }
            if *state.patch_returns_empty.lock().unwrap() {
                StatusCode::NO_CONTENT.into_response()
            } else {
                json_response(StatusCode::OK, resource.value())
            }
        }
        Method::DELETE => match state.resources.remove(&path) {
            Some(_) => StatusCode::NO_CONTENT.into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn create_session(state: &MockState, body: Option<Value>) -> Response {
    let expected = state.credentials.lock().unwrap().clone();
    let body = body.unwrap_or(Value::Null);
    let accepted = match expected {
        Some((username, password)) => {
            body.get("UserName").and_then(Value::as_str) == Some(username.as_str())
                && body.get("Password").and_then(Value::as_str) == Some(password.as_str())
        }
        None => false,
    };
    if !accepted {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let location = format!("{}/{}", SESSIONS_URI, id);
    let session = json!({"@odata.id": location, "Id": id.to_string(), "UserName": body["UserName"]});
    state.resources.insert(location.clone(), session.clone());

    let mut response = with_location(json_response(StatusCode::CREATED, &session), &location);
    if !*state.session_omits_token.lock().unwrap() {
        let token = state.session_token.lock().unwrap().clone();
        response
            .headers_mut()
            .insert("X-Auth-Token", HeaderValue::from_str(&token).unwrap());
    }
    response
}

fn create_member(state: &MockState, path: &str, body: Option<Value>) -> Response {
    let Some(mut collection) = state.resources.get_mut(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let location = format!("{}/Member{}", path, id);

    let mut member = body.unwrap_or_else(|| json!({}));
    member["@odata.id"] = Value::String(location.clone());
    member["Id"] = Value::String(id.to_string());

    if let Some(Value::Array(members)) = collection.get_mut("Members") {
        members.push(json!({"@odata.id": location}));
        let count = members.len();
        collection["Members@odata.count"] = json!(count);
    }
    drop(collection);
    state.resources.insert(location.clone(), member.clone());

    if *state.post_returns_empty.lock().unwrap() {
        with_location(StatusCode::CREATED.into_response(), &location)
    } else {
        with_location(json_response(StatusCode::CREATED, &member), &location)
    }
}
