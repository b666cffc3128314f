//! Typed session client and its builder

use crate::config::{CredentialMode, DEFAULT_REFRESH_TIMEOUT, DEFAULT_USER_AGENT};
use crate::error::ClientError;
use crate::pipeline::RequestPipeline;
use crate::refresh::RefreshCoordinator;
use crate::request::{HttpResponse, PendingRequest};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{AuthResponse, LoginRequest, RegisterRequest, paths};
use authflow_core::{
    KeyValueStore, MemoryStore, NavigationSink, NullNavigation, SessionLifecycle, SessionState,
    Token, TokenStore, User,
};
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// High-level client for the remote auth service.
///
/// Owns the pipeline, the refresh coordinator and the session lifecycle;
/// cheap to clone and share across tasks.
#[derive(Clone)]
pub struct SessionClient {
    pipeline: Arc<RequestPipeline>,
    tokens: Arc<TokenStore>,
    session: Arc<SessionLifecycle>,
    mode: CredentialMode,
}

impl SessionClient {
    /// Create a client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    pub fn builder() -> SessionClientBuilder {
        SessionClientBuilder::default()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn session(&self) -> &Arc<SessionLifecycle> {
        &self.session
    }

    /// Log in and establish an authenticated session.
    ///
    /// A 4xx here is a validation failure to show the user; session state
    /// is not touched by a rejected login.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, ClientError> {
        let request = PendingRequest::new(Method::POST, paths::LOGIN)
            .with_body(serde_json::to_value(credentials)?);
        let response = self.pipeline.execute_public(request).await?;
        if !response.status.is_success() {
            return Err(auth_endpoint_error(&response));
        }

        let parsed: AuthResponse = response.json()?;
        let token = self.delivered_token(&parsed)?;
        self.session.authenticate(token, &parsed.user).await?;
        Ok(parsed)
    }

    /// Register a new account. Does not log the user in; the service
    /// expects an explicit login afterwards.
    pub async fn register(&self, details: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        let request = PendingRequest::new(Method::POST, paths::REGISTER)
            .with_body(serde_json::to_value(details)?);
        let response = self.pipeline.execute_public(request).await?;
        if !response.status.is_success() {
            return Err(auth_endpoint_error(&response));
        }
        Ok(response.json()?)
    }

    /// Fetch the authenticated user's profile
    pub async fn profile(&self) -> Result<User, ClientError> {
        let response = self
            .pipeline
            .execute(PendingRequest::new(Method::GET, paths::PROFILE))
            .await?;
        if !response.status.is_success() {
            return Err(ClientError::from_status(response.status, response.message()));
        }
        Ok(response.json()?)
    }

    /// Log out: best-effort revocation on the server, then local
    /// termination. Local state is cleared even when the network call
    /// fails, matching the service's own logout semantics.
    pub async fn logout(&self) {
        let mut request = PendingRequest::new(Method::POST, paths::LOGOUT);
        if self.mode == CredentialMode::HeaderBearer {
            if let Some(token) = self.tokens.get() {
                request = request.with_body(serde_json::json!({ "refresh": token.refresh_token }));
            }
        }
        if let Err(e) = self.pipeline.execute_public(request).await {
            warn!(error = %e, "logout call failed, clearing local session anyway");
        }
        self.session.terminate().await;
    }

    /// Restore a persisted session after a restart.
    ///
    /// Returns the stored user when credentials were found. Only
    /// meaningful in header-bearer mode; cookie deployments restore
    /// nothing client-side.
    pub async fn restore(&self) -> Result<Option<User>, ClientError> {
        if self.tokens.load().await?.is_none() {
            return Ok(None);
        }
        self.session.resume();
        let user = self.tokens.get_user().await?;
        debug!("restored persisted session");
        Ok(user)
    }

    /// Execute an arbitrary authenticated request through the pipeline
    pub async fn execute(&self, request: PendingRequest) -> Result<HttpResponse, ClientError> {
        self.pipeline.execute(request).await
    }

    fn delivered_token(&self, response: &AuthResponse) -> Result<Option<Token>, ClientError> {
        match self.mode {
            CredentialMode::HeaderBearer => match (&response.access, &response.refresh) {
                (Some(access), Some(refresh)) => {
                    Ok(Some(Token::new(access.clone(), refresh.clone())))
                }
                _ => Err(ClientError::Configuration(
                    "login response did not deliver tokens in header-bearer mode".to_string(),
                )),
            },
            CredentialMode::CookieCredential => Ok(None),
        }
    }
}

/// Map a non-success login/register response: 4xx bodies are
/// server-provided validation messages, everything else is a server error.
fn auth_endpoint_error(response: &HttpResponse) -> ClientError {
    if response.status.is_client_error() {
        ClientError::Validation {
            status: response.status.as_u16(),
            message: response.message(),
        }
    } else {
        ClientError::Server {
            status: response.status.as_u16(),
            message: response.message(),
        }
    }
}

/// Builder for [`SessionClient`]
#[derive(Default)]
pub struct SessionClientBuilder {
    base_url: Option<String>,
    credential_mode: CredentialMode,
    refresh_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    user_agent: Option<String>,
    store: Option<Arc<dyn KeyValueStore>>,
    navigation: Option<Arc<dyn NavigationSink>>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl SessionClientBuilder {
    /// Set the base URL (required unless a custom transport is injected)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Choose how credentials travel with requests
    pub fn credential_mode(mut self, mode: CredentialMode) -> Self {
        self.credential_mode = mode;
        self
    }

    /// Bound the leader's refresh network call
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    /// Set the per-request transport timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Inject the persistent key-value collaborator; defaults to an
    /// in-memory store
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Inject the navigation collaborator signalled on termination
    pub fn navigation(mut self, navigation: Arc<dyn NavigationSink>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Inject a custom transport instead of the reqwest-backed one
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<SessionClient, ClientError> {
        let mode = self.credential_mode;
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => {
                let base_url = self
                    .base_url
                    .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
                // Cookie deployments need the jar; header mode must not
                // resend server cookies alongside bearer credentials.
                let cookie_store = mode == CredentialMode::CookieCredential;
                Arc::new(ReqwestTransport::with_options(
                    base_url,
                    self.request_timeout,
                    &user_agent,
                    cookie_store,
                )?)
            }
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let navigation = self
            .navigation
            .unwrap_or_else(|| Arc::new(NullNavigation) as Arc<dyn NavigationSink>);

        let tokens = Arc::new(TokenStore::new(store));
        let session = Arc::new(SessionLifecycle::new(tokens.clone(), navigation));
        let coordinator = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            tokens.clone(),
            session.clone(),
            mode,
            self.refresh_timeout.unwrap_or(DEFAULT_REFRESH_TIMEOUT),
        ));
        let pipeline = Arc::new(RequestPipeline::new(
            transport,
            tokens.clone(),
            coordinator,
            mode,
        ));

        Ok(SessionClient {
            pipeline,
            tokens,
            session,
            mode,
        })
    }
}
