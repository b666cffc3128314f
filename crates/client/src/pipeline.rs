//! Request pipeline: credential attachment, dispatch, 401 recovery

use crate::config::CredentialMode;
use crate::error::ClientError;
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::request::{HttpResponse, PendingRequest};
use crate::transport::HttpTransport;
use authflow_core::TokenStore;
use http::StatusCode;
use std::sync::Arc;
use tracing::debug;

/// Wraps each outbound call.
///
/// Reads a token snapshot, attaches it per the credential mode, dispatches
/// through the transport, and on a 401 triggers one coordinated refresh
/// followed by exactly one retry. Refresh is never issued against the
/// transport directly, only through the coordinator.
pub struct RequestPipeline {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    mode: CredentialMode,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
        mode: CredentialMode,
    ) -> Self {
        Self {
            transport,
            tokens,
            coordinator,
            mode,
        }
    }

    /// Execute an authenticated request.
    ///
    /// Every response other than 401 — success, other 4xx, 5xx — is
    /// returned to the caller unmodified, as are transport errors.
    pub async fn execute(&self, mut request: PendingRequest) -> Result<HttpResponse, ClientError> {
        loop {
            // Fresh snapshot per attempt: a retry after refresh picks up
            // the new token, never the stale one captured earlier.
            let attempt = self.with_credentials(request.clone());
            let response = self.transport.send(&attempt).await?;

            if response.status != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if request.retried {
                debug!(id = %request.id, "request rejected again after refresh");
                return Err(ClientError::Auth(
                    "request was rejected again after a token refresh".to_string(),
                ));
            }

            debug!(id = %request.id, "received 401, requesting coordinated refresh");
            match self.coordinator.refresh().await {
                RefreshOutcome::Success(_) => request.retried = true,
                RefreshOutcome::Failure(reason) => return Err(ClientError::RefreshFailed(reason)),
            }
        }
    }

    /// Dispatch without credentials or retry, for anonymous endpoints
    /// where a 401 means "bad input", not "token expired".
    pub async fn execute_public(
        &self,
        request: PendingRequest,
    ) -> Result<HttpResponse, ClientError> {
        Ok(self.transport.send(&request).await?)
    }

    fn with_credentials(&self, mut request: PendingRequest) -> PendingRequest {
        if self.mode == CredentialMode::HeaderBearer {
            if let Some(token) = self.tokens.get() {
                request.headers.push((
                    "authorization".to_string(),
                    format!("Bearer {}", token.access_token),
                ));
            }
        }
        request
    }
}
