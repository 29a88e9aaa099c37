use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Notify;

use crate::{
    config::AppConfig,
    error::{AuthError, ConsoleError, NetworkError},
    session::SessionReader,
};

// --- Wire Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        })
    }
}

/// ApiRequest
///
/// A fully resolved outgoing call, as handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Path relative to the base URL (`api/alunos/42`).
    pub path: String,
    /// Absolute URL (`base_url + path`).
    pub url: String,
    /// Bearer credential, present only when a session token exists.
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

/// ApiResponse
///
/// An HTTP response that arrived, whatever its status. Transport failures never
/// produce one; they are `NetworkError` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// ApiPayload
///
/// Successful envelope, unwrapped: `data` plus the optional human `message`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiPayload {
    pub data: Value,
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// into_payload
    ///
    /// The single interpretation point for response envelopes. Status code first:
    /// - 2xx: success, payload is `data` when present, otherwise the whole body.
    /// - 401/403: `AuthError::Rejected`; the session is no longer usable.
    /// - anything else: `Domain`, with the body's message (string or field map) as
    ///   detail, or `fallback` when the body carries none.
    pub fn into_payload(self, fallback: &str) -> Result<ApiPayload, ConsoleError> {
        if self.is_success() {
            let message = self.body.get("message").and_then(Value::as_str).map(str::to_string);
            let data = match self.body.get("data") {
                Some(data) if !data.is_null() => data.clone(),
                _ => self.body,
            };
            return Ok(ApiPayload { data, message });
        }

        if self.status == 401 || self.status == 403 {
            return Err(AuthError::Rejected { status: self.status }.into());
        }

        let detail = ErrorDetail::from_body(&self.body);
        Err(ConsoleError::Domain {
            status: self.status,
            message: detail.message.unwrap_or_else(|| fallback.to_string()),
            fields: detail.fields,
        })
    }
}

/// Message extracted from an error envelope: a flattened notice plus, when the
/// server sent a field-keyed map, the per-field texts.
#[derive(Debug, Default, PartialEq)]
pub struct ErrorDetail {
    pub message: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl ErrorDetail {
    pub fn from_body(body: &Value) -> Self {
        let raw = body
            .get("message")
            .or_else(|| body.get("data").and_then(|data| data.get("message")));

        match raw {
            Some(Value::String(s)) if !s.trim().is_empty() => Self {
                message: Some(s.clone()),
                fields: BTreeMap::new(),
            },
            Some(Value::Object(map)) => {
                let fields: BTreeMap<String, String> = map
                    .iter()
                    .map(|(key, value)| (key.clone(), message_text(value)))
                    .filter(|(_, text)| !text.is_empty())
                    .collect();
                let message = flatten_field_errors(map);
                Self {
                    message: (!message.is_empty()).then_some(message),
                    fields,
                }
            }
            Some(Value::Array(items)) => {
                let message = items.iter().map(message_text).collect::<Vec<_>>().join(" ");
                Self {
                    message: (!message.trim().is_empty()).then_some(message),
                    fields: BTreeMap::new(),
                }
            }
            _ => Self::default(),
        }
    }
}

/// flatten_field_errors
///
/// Turns `{"nome": "...", "cpf": ["...", "..."]}` into one notice. Keys are visited
/// in sorted order, so the same map always yields the same text.
pub fn flatten_field_errors(map: &Map<String, Value>) -> String {
    let sorted: BTreeMap<&String, &Value> = map.iter().collect();
    sorted
        .values()
        .map(|value| message_text(value))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(message_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// --- Transport Contract ---

/// Transport
///
/// The seam between the gateway and the network. `ReqwestTransport` talks HTTP;
/// `MockTransport` replays scripted responses for tests. Implementations do not
/// retry and do not interpret status codes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError>;
}

pub type TransportState = Arc<dyn Transport>;

/// ReqwestTransport
///
/// The real HTTP client. Bodies that are not JSON are surfaced as a JSON string so
/// callers still see the text; empty bodies become `null`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| NetworkError(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| NetworkError(e.to_string()))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse { status, body })
    }
}

// --- Gateway ---

/// ApiGateway
///
/// Wraps every backend call: joins the base path, attaches `Authorization: Bearer`
/// when (and only when) the session holds a token, and passes the HTTP outcome
/// through untouched. Cheap to clone; all clones share the transport and the
/// session reader.
#[derive(Clone)]
pub struct ApiGateway {
    transport: TransportState,
    base_url: String,
    session: SessionReader,
}

impl ApiGateway {
    pub fn new(config: &AppConfig, transport: TransportState, session: SessionReader) -> Self {
        Self {
            transport,
            base_url: config.api_base_url.clone(),
            session,
        }
    }

    pub fn session(&self) -> &SessionReader {
        &self.session
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, NetworkError> {
        let path = path.trim_start_matches('/').to_string();
        let request = ApiRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            path,
            bearer: self.session.token(),
            body,
        };

        tracing::debug!(method = %request.method, path = %request.path, "api request");
        let result = self.transport.send(request).await;
        match &result {
            Ok(response) => tracing::debug!(status = response.status, "api response"),
            Err(e) => tracing::warn!(error = %e, "api transport failure"),
        }
        result
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, NetworkError> {
        self.request(HttpMethod::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, NetworkError> {
        self.request(HttpMethod::Post, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse, NetworkError> {
        self.request(HttpMethod::Put, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, NetworkError> {
        self.request(HttpMethod::Delete, path, None).await
    }
}

// --- Mock Transport (For Tests) ---

struct MockReply {
    outcome: Result<ApiResponse, NetworkError>,
    gate: Option<Arc<Notify>>,
}

/// MockTransport
///
/// Scripted transport used by unit and integration tests. Replies are queued per
/// `(method, path)` and consumed in order; the last queued reply for a route is
/// reused once the queue is down to one. Every request is recorded. A gated reply
/// waits until its `Notify` fires, which lets tests decide completion order.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<(HttpMethod, String), VecDeque<MockReply>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: HttpMethod, path: &str, reply: MockReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies
                .entry((method, path.to_string()))
                .or_default()
                .push_back(reply);
        }
    }

    /// Queue a response for `method path`.
    pub fn on(&self, method: HttpMethod, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, MockReply {
            outcome: Ok(ApiResponse::new(status, body)),
            gate: None,
        });
        self
    }

    /// Queue a transport failure for `method path`.
    pub fn on_network_error(&self, method: HttpMethod, path: &str) -> &Self {
        self.push(method, path, MockReply {
            outcome: Err(NetworkError("mock transport: connection refused".to_string())),
            gate: None,
        });
        self
    }

    /// Queue a response that is only delivered after the returned handle is notified.
    pub fn on_gated(&self, method: HttpMethod, path: &str, status: u16, body: Value) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(method, path, MockReply {
            outcome: Ok(ApiResponse::new(status, body)),
            gate: Some(gate.clone()),
        });
        gate
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn requests_to(&self, method: HttpMethod, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError> {
        let key = (request.method, request.path.clone());
        if let Ok(mut log) = self.requests.lock() {
            log.push(request);
        }

        // The lock is released before any await.
        let reply = self.replies.lock().ok().and_then(|mut replies| {
            let queue = replies.get_mut(&key)?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().map(|reply| MockReply {
                    outcome: reply.outcome.clone(),
                    gate: reply.gate.clone(),
                })
            }
        });

        let Some(reply) = reply else {
            return Ok(ApiResponse::new(404, serde_json::json!({ "message": "not scripted" })));
        };
        if let Some(gate) = reply.gate {
            gate.notified().await;
        }
        reply.outcome
    }
}
