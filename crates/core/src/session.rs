//! Session lifecycle and termination signalling

use crate::error::StoreResult;
use crate::token_store::TokenStore;
use crate::types::{SessionState, Token, User};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Navigation collaborator notified when the session is terminated.
///
/// Hosts route this to whatever "go to the login screen" means for them.
pub trait NavigationSink: Send + Sync {
    fn redirect_to_login(&self);
}

/// Sink that only records the redirect in the log
#[derive(Debug, Default)]
pub struct NullNavigation;

impl NavigationSink for NullNavigation {
    fn redirect_to_login(&self) {
        debug!("session terminated; no navigation sink installed");
    }
}

/// Owns session state transitions.
///
/// All transitions are serialized behind one mutex; collaborators read the
/// state but never mutate it directly. `terminate` is idempotent and emits
/// exactly one redirect signal no matter how many callers race it.
pub struct SessionLifecycle {
    state: Mutex<SessionState>,
    tokens: Arc<TokenStore>,
    navigation: Arc<dyn NavigationSink>,
}

impl SessionLifecycle {
    pub fn new(tokens: Arc<TokenStore>, navigation: Arc<dyn NavigationSink>) -> Self {
        Self {
            state: Mutex::new(SessionState::Anonymous),
            tokens,
            navigation,
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a successful login or registration.
    ///
    /// In cookie-credential deployments there is no client-visible token;
    /// only the user record is persisted.
    pub async fn authenticate(&self, token: Option<Token>, user: &User) -> StoreResult<()> {
        if let Some(token) = token {
            self.tokens.set(token).await?;
        }
        self.tokens.set_user(user).await?;
        self.transition(SessionState::Authenticated);
        info!(user = %user.username, "session authenticated");
        Ok(())
    }

    /// Mark a previously persisted session as live again after a restart
    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SessionState::Anonymous {
            *state = SessionState::Authenticated;
            debug!("session resumed from persisted credentials");
        }
    }

    /// Mark the start of a coordinated token refresh
    pub fn refresh_started(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SessionState::Authenticated {
            *state = SessionState::RefreshPending;
        }
    }

    /// Mark the end of a successful token refresh
    pub fn refresh_succeeded(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SessionState::RefreshPending {
            *state = SessionState::Authenticated;
        }
    }

    /// Terminate the session: clear stored credentials and signal the
    /// navigation collaborator once.
    ///
    /// Idempotent; concurrent callers race for a single claim on the
    /// `Terminated` transition and only the winner clears and redirects.
    pub async fn terminate(&self) {
        let claimed = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == SessionState::Terminated {
                false
            } else {
                *state = SessionState::Terminated;
                true
            }
        };

        if !claimed {
            return;
        }

        if let Err(e) = self.tokens.clear().await {
            // Termination still proceeds; the cache is already dropped.
            warn!(error = %e, "failed to clear persisted credentials during termination");
        }
        info!("session terminated, redirecting to login");
        self.navigation.redirect_to_login();
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNavigation {
        redirects: AtomicUsize,
    }

    impl NavigationSink for CountingNavigation {
        fn redirect_to_login(&self) {
            self.redirects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn lifecycle_with_counter() -> (Arc<SessionLifecycle>, Arc<CountingNavigation>) {
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStore::new())));
        let navigation = Arc::new(CountingNavigation::default());
        let lifecycle = Arc::new(SessionLifecycle::new(tokens, navigation.clone()));
        (lifecycle, navigation)
    }

    fn sample_user() -> User {
        User {
            id: 7,
            username: "bea".into(),
            email: "b@x.com".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn authenticate_sets_state_and_stores_token() {
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStore::new())));
        let lifecycle = SessionLifecycle::new(tokens.clone(), Arc::new(NullNavigation));

        lifecycle
            .authenticate(Some(Token::new("a", "r")), &sample_user())
            .await
            .unwrap();

        assert_eq!(lifecycle.state(), SessionState::Authenticated);
        assert_eq!(tokens.get().map(|t| t.access_token), Some("a".to_string()));
        assert!(tokens.get_user().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn terminate_clears_tokens_and_redirects_once() {
        let (lifecycle, navigation) = lifecycle_with_counter();
        lifecycle
            .authenticate(Some(Token::new("a", "r")), &sample_user())
            .await
            .unwrap();

        lifecycle.terminate().await;
        lifecycle.terminate().await;

        assert_eq!(lifecycle.state(), SessionState::Terminated);
        assert_eq!(navigation.redirects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_terminations_redirect_exactly_once() {
        let (lifecycle, navigation) = lifecycle_with_counter();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lifecycle = lifecycle.clone();
            handles.push(tokio::spawn(async move { lifecycle.terminate().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(navigation.redirects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_transitions_are_guarded_by_current_state() {
        let (lifecycle, _) = lifecycle_with_counter();

        // Refresh markers are ignored while anonymous.
        lifecycle.refresh_started();
        assert_eq!(lifecycle.state(), SessionState::Anonymous);

        lifecycle
            .authenticate(Some(Token::new("a", "r")), &sample_user())
            .await
            .unwrap();
        lifecycle.refresh_started();
        assert_eq!(lifecycle.state(), SessionState::RefreshPending);
        lifecycle.refresh_succeeded();
        assert_eq!(lifecycle.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn resume_only_applies_to_anonymous_sessions() {
        let (lifecycle, _) = lifecycle_with_counter();
        lifecycle.resume();
        assert_eq!(lifecycle.state(), SessionState::Authenticated);

        lifecycle.terminate().await;
        lifecycle.resume();
        assert_eq!(lifecycle.state(), SessionState::Terminated);
    }
}
