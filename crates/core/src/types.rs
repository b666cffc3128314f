use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credential pair issued by the auth service.
///
/// Both tokens are opaque strings; nothing in this crate inspects or
/// validates their internal structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
}

impl Token {
    /// Create a token pair stamped with the current time
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            issued_at: Utc::now(),
        }
    }
}

/// Account record returned by the auth service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Session state of the client.
///
/// Exactly one state holds at any instant; transitions are serialized
/// through [`crate::SessionLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    RefreshPending,
    Terminated,
}
