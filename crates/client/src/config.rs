//! Client configuration

use std::time::Duration;

/// How credentials travel with outbound requests.
///
/// Exactly one mode is active per deployment; the two are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// Tokens are held client-side and attached as `Authorization: Bearer`.
    #[default]
    HeaderBearer,
    /// The server sets and reads httpOnly cookies; the client attaches
    /// nothing explicit and the transport's cookie jar carries credentials.
    CookieCredential,
}

/// Bound on the leader's refresh network call. On expiry the refresh is
/// treated as failed and all waiters are released.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_USER_AGENT: &str = "authflow-client/0.1.0";
