//! Single-flight token refresh coordination
//!
//! Under N concurrent requests that all hit a 401 at roughly the same
//! time, the refresh endpoint must be called exactly once and all N
//! callers must observe the same outcome. The first caller to find the
//! flight slot empty becomes the leader; everyone arriving while the slot
//! is occupied joins as a follower and waits on the leader's result.

use crate::config::CredentialMode;
use crate::error::TransportError;
use crate::request::PendingRequest;
use crate::transport::HttpTransport;
use crate::types::{RefreshResponse, paths};
use authflow_core::{SessionLifecycle, Token, TokenStore};
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

/// Why a refresh cycle failed. Always followed by session termination.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("refresh endpoint rejected the token ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("refresh call timed out")]
    TimedOut,

    #[error("refresh transport failed: {0}")]
    Network(String),

    #[error("no refresh token available")]
    MissingToken,

    #[error("refreshed token could not be persisted: {0}")]
    Persist(String),

    #[error("refresh response was malformed: {0}")]
    Malformed(String),

    #[error("refresh was interrupted before an outcome was delivered")]
    Interrupted,
}

/// Result of one refresh cycle, broadcast to every waiter
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Success(Token),
    Failure(RefreshError),
}

type FlightSlot = Mutex<Option<watch::Receiver<Option<RefreshOutcome>>>>;

/// Coordinates refresh cycles so at most one network call is in flight.
///
/// State machine: Idle -> RefreshPending -> Idle. The leader's call runs
/// in a detached task so cancelling the caller of [`refresh`] never
/// cancels the refresh itself; the bounded timeout is the only way the
/// call is cut short. On failure the token store is cleared and the
/// session terminated before waiters are released.
pub struct RefreshCoordinator {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenStore>,
    session: Arc<SessionLifecycle>,
    mode: CredentialMode,
    call_timeout: Duration,
    flight: Arc<FlightSlot>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<TokenStore>,
        session: Arc<SessionLifecycle>,
        mode: CredentialMode,
        call_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            tokens,
            session,
            mode,
            call_timeout,
            flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Obtain a refresh outcome, joining the in-flight cycle if one exists.
    ///
    /// Dropping the returned future releases a follower early without
    /// consuming the outcome; the leader and other followers are
    /// unaffected.
    pub async fn refresh(&self) -> RefreshOutcome {
        let mut rx = {
            let mut flight = self.flight.lock().await;
            if let Some(rx) = flight.clone() {
                debug!("joining in-flight token refresh");
                rx
            } else {
                let (tx, rx) = watch::channel(None);
                *flight = Some(rx.clone());
                self.spawn_leader(tx);
                rx
            }
        };

        // The watch channel retains the last value, so a waiter arriving
        // after delivery but before the slot is cleared still sees it.
        loop {
            let delivered = rx.borrow_and_update().clone();
            if let Some(outcome) = delivered {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return RefreshOutcome::Failure(RefreshError::Interrupted);
            }
        }
    }

    fn spawn_leader(&self, tx: watch::Sender<Option<RefreshOutcome>>) {
        let transport = Arc::clone(&self.transport);
        let tokens = Arc::clone(&self.tokens);
        let session = Arc::clone(&self.session);
        let flight = Arc::clone(&self.flight);
        let mode = self.mode;
        let call_timeout = self.call_timeout;

        tokio::spawn(async move {
            session.refresh_started();
            debug!("leading token refresh");

            let result =
                tokio::time::timeout(call_timeout, run_refresh(&*transport, &tokens, mode)).await;

            let outcome = match result {
                Ok(Ok(token)) => match persist(&tokens, mode, &token).await {
                    Ok(()) => {
                        session.refresh_succeeded();
                        debug!("token refresh succeeded");
                        RefreshOutcome::Success(token)
                    }
                    Err(e) => RefreshOutcome::Failure(e),
                },
                Ok(Err(e)) => RefreshOutcome::Failure(e),
                Err(_) => RefreshOutcome::Failure(RefreshError::TimedOut),
            };

            if let RefreshOutcome::Failure(reason) = &outcome {
                warn!(error = %reason, "token refresh failed, terminating session");
                if let Err(e) = tokens.clear().await {
                    warn!(error = %e, "failed to clear tokens after refresh failure");
                }
                session.terminate().await;
            }

            // Publish before releasing the slot so late joiners still
            // observe this cycle's outcome instead of starting a new one.
            let _ = tx.send(Some(outcome));
            *flight.lock().await = None;
        });
    }
}

/// The new token must be visible to every resumed request before it
/// re-attempts its call; persisting happens before the outcome is sent.
async fn persist(
    tokens: &TokenStore,
    mode: CredentialMode,
    token: &Token,
) -> Result<(), RefreshError> {
    if mode == CredentialMode::HeaderBearer {
        tokens
            .set(token.clone())
            .await
            .map_err(|e| RefreshError::Persist(e.to_string()))?;
    }
    Ok(())
}

async fn run_refresh(
    transport: &dyn HttpTransport,
    tokens: &TokenStore,
    mode: CredentialMode,
) -> Result<Token, RefreshError> {
    let current = tokens.get();

    let mut request = PendingRequest::new(Method::POST, paths::TOKEN_REFRESH);
    match mode {
        CredentialMode::HeaderBearer => {
            let refresh = current
                .as_ref()
                .map(|t| t.refresh_token.clone())
                .ok_or(RefreshError::MissingToken)?;
            request = request.with_body(serde_json::json!({ "refresh": refresh }));
        }
        // Cookie-carried; the transport's jar supplies the credential.
        CredentialMode::CookieCredential => {}
    }

    debug!(id = %request.id, "issuing refresh call");
    let response = transport.send(&request).await.map_err(|e| match e {
        TransportError::Timeout => RefreshError::TimedOut,
        other => RefreshError::Network(other.to_string()),
    })?;

    if !response.status.is_success() {
        return Err(RefreshError::Rejected {
            status: response.status.as_u16(),
            message: response.message(),
        });
    }

    let parsed: RefreshResponse = response
        .json()
        .map_err(|e| RefreshError::Malformed(e.to_string()))?;

    // Keep the stored refresh token unless the server rotated it.
    let refresh_token = parsed
        .refresh
        .or(current.map(|t| t.refresh_token))
        .unwrap_or_default();
    Ok(Token::new(parsed.access, refresh_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use authflow_core::{MemoryStore, NavigationSink, SessionState, User};
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct CountingNavigation {
        redirects: AtomicUsize,
    }

    impl NavigationSink for CountingNavigation {
        fn redirect_to_login(&self) {
            self.redirects.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Transport whose refresh endpoint counts calls, optionally waiting
    /// on a gate before answering with the configured response.
    struct ScriptedRefresh {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        status: StatusCode,
        body: String,
    }

    impl ScriptedRefresh {
        fn succeeding() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                status: StatusCode::OK,
                body: r#"{"access":"fresh-access"}"#.to_string(),
            }
        }

        fn rejecting() -> Self {
            Self {
                status: StatusCode::UNAUTHORIZED,
                body: r#"{"error":"Token inválido ou expirado"}"#.to_string(),
                ..Self::succeeding()
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::succeeding()
            }
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for ScriptedRefresh {
        async fn send(
            &self,
            request: &PendingRequest,
        ) -> Result<crate::request::HttpResponse, TransportError> {
            assert_eq!(request.path, paths::TOKEN_REFRESH);
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(crate::request::HttpResponse::new(
                self.status,
                self.body.clone(),
            ))
        }
    }

    struct Harness {
        coordinator: Arc<RefreshCoordinator>,
        transport: Arc<ScriptedRefresh>,
        tokens: Arc<TokenStore>,
        session: Arc<SessionLifecycle>,
        navigation: Arc<CountingNavigation>,
    }

    async fn harness(transport: ScriptedRefresh, timeout: Duration) -> Harness {
        let transport = Arc::new(transport);
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStore::new())));
        let navigation = Arc::new(CountingNavigation {
            redirects: AtomicUsize::new(0),
        });
        let session = Arc::new(SessionLifecycle::new(tokens.clone(), navigation.clone()));
        let user = User {
            id: 1,
            username: "ana".into(),
            email: "a@x.com".into(),
            created_at: chrono::Utc::now(),
        };
        session
            .authenticate(Some(Token::new("stale-access", "valid-refresh")), &user)
            .await
            .unwrap();
        let coordinator = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            tokens.clone(),
            session.clone(),
            CredentialMode::HeaderBearer,
            timeout,
        ));
        Harness {
            coordinator,
            transport,
            tokens,
            session,
            navigation,
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_network_call() {
        let gate = Arc::new(Notify::new());
        let h = harness(ScriptedRefresh::gated(gate.clone()), Duration::from_secs(5)).await;

        let mut waiters = Vec::new();
        for _ in 0..10 {
            let coordinator = h.coordinator.clone();
            waiters.push(tokio::spawn(async move { coordinator.refresh().await }));
        }
        // Let every waiter reach the flight slot, then release the leader.
        tokio::task::yield_now().await;
        gate.notify_one();

        for waiter in waiters {
            match waiter.await.unwrap() {
                RefreshOutcome::Success(token) => assert_eq!(token.access_token, "fresh-access"),
                RefreshOutcome::Failure(e) => panic!("expected success, got {e}"),
            }
        }
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_updates_the_token_store_before_release() {
        let h = harness(ScriptedRefresh::succeeding(), Duration::from_secs(5)).await;

        let outcome = h.coordinator.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Success(_)));

        let stored = h.tokens.get().unwrap();
        assert_eq!(stored.access_token, "fresh-access");
        // Refresh token is kept when the server does not rotate it.
        assert_eq!(stored.refresh_token, "valid-refresh");
        assert_eq!(h.session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn rejection_clears_tokens_and_terminates_once() {
        let h = harness(ScriptedRefresh::rejecting(), Duration::from_secs(5)).await;

        let outcome = h.coordinator.refresh().await;
        match outcome {
            RefreshOutcome::Failure(RefreshError::Rejected { status, .. }) => {
                assert_eq!(status, 401)
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        assert!(h.tokens.get().is_none());
        assert_eq!(h.session.state(), SessionState::Terminated);
        assert_eq!(h.navigation.redirects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_waiters_see_the_same_failure() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            ScriptedRefresh {
                gate: Some(gate.clone()),
                ..ScriptedRefresh::rejecting()
            },
            Duration::from_secs(5),
        )
        .await;

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let coordinator = h.coordinator.clone();
            waiters.push(tokio::spawn(async move { coordinator.refresh().await }));
        }
        tokio::task::yield_now().await;
        gate.notify_one();

        for waiter in waiters {
            assert!(matches!(
                waiter.await.unwrap(),
                RefreshOutcome::Failure(RefreshError::Rejected { .. })
            ));
        }
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.navigation.redirects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn leader_timeout_releases_all_waiters() {
        // The gate is never opened, so only the timeout can end the cycle.
        let gate = Arc::new(Notify::new());
        let h = harness(ScriptedRefresh::gated(gate), Duration::from_millis(100)).await;

        let outcome = h.coordinator.refresh().await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Failure(RefreshError::TimedOut)
        ));
        assert_eq!(h.session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn cancelled_follower_does_not_disturb_the_cycle() {
        let gate = Arc::new(Notify::new());
        let h = harness(ScriptedRefresh::gated(gate.clone()), Duration::from_secs(5)).await;

        let leader = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.refresh().await })
        };
        tokio::task::yield_now().await;

        let follower = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.refresh().await })
        };
        tokio::task::yield_now().await;
        follower.abort();
        assert!(follower.await.is_err());

        gate.notify_one();
        assert!(matches!(
            leader.await.unwrap(),
            RefreshOutcome::Success(_)
        ));
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_a_network_call() {
        let h = harness(ScriptedRefresh::succeeding(), Duration::from_secs(5)).await;
        h.tokens.clear().await.unwrap();

        let outcome = h.coordinator.refresh().await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Failure(RefreshError::MissingToken)
        ));
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_new_cycle_starts_after_the_slot_is_released() {
        let h = harness(ScriptedRefresh::succeeding(), Duration::from_secs(5)).await;

        assert!(matches!(
            h.coordinator.refresh().await,
            RefreshOutcome::Success(_)
        ));
        assert!(matches!(
            h.coordinator.refresh().await,
            RefreshOutcome::Success(_)
        ));
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 2);
    }
}
