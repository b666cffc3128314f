//! HTTP transport abstraction and the reqwest-backed implementation

use crate::config::DEFAULT_USER_AGENT;
use crate::error::TransportError;
use crate::request::{HttpResponse, PendingRequest};
use async_trait::async_trait;
use std::time::Duration;

/// Dispatches one prepared request and returns whatever the server said.
///
/// Implementations report only I/O-level failures as errors; non-success
/// statuses come back as responses so the pipeline can interpret them.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &PendingRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by [`reqwest`]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_options(base_url, None, DEFAULT_USER_AGENT, false)
    }

    /// Create a transport with explicit options. `cookie_store` enables the
    /// jar required by cookie-credential deployments.
    pub fn with_options(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
        user_agent: &str,
        cookie_store: bool,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut builder = reqwest::ClientBuilder::new()
            .user_agent(user_agent)
            .cookie_store(cookie_store);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &PendingRequest) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse::new(status, body))
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Connection(error.to_string())
    }
}
