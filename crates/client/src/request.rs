//! Request and response values carried through the pipeline

use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// One outbound request.
///
/// `retried` starts false and flips to true at most once, after a
/// successful coordinated refresh. A request that fails auth again with
/// `retried == true` is surfaced as a terminal auth error, never retried.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: Uuid,
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub retried: bool,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            retried: false,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response as seen by the pipeline: status plus raw body text
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Best-effort human-readable message: the server's `error` or
    /// `message` field when the body is JSON, otherwise the raw body.
    pub fn message(&self) -> String {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&self.body) {
            for field in ["error", "message", "detail"] {
                if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                    return text.to_string();
                }
            }
        }
        if self.body.is_empty() {
            self.status.to_string()
        } else {
            self.body.clone()
        }
    }
}
