//! Client error types

use crate::refresh::RefreshError;
use authflow_core::StoreError;
use http::StatusCode;
use thiserror::Error;

/// Errors surfaced to callers of the session client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure, surfaced unchanged; no retry is performed
    #[error("request failed: {0}")]
    Network(#[from] TransportError),

    /// 401/403 after the one-refresh retry budget is exhausted
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The refresh endpoint rejected the refresh token or timed out;
    /// the session has already been terminated when this is returned
    #[error("session refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// 4xx with a server-provided message, passed through for display
    #[error("validation failed ({status}): {message}")]
    Validation { status: u16, message: String },

    /// Any other non-success status
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Key-value collaborator failure
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ClientError {
    /// Map a non-success HTTP status to an error
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth(message),
            s if s.is_client_error() => Self::Validation {
                status: s.as_u16(),
                message,
            },
            s => Self::Server {
                status: s.as_u16(),
                message,
            },
        }
    }
}

/// I/O-level transport failures. Non-success HTTP statuses are not
/// transport errors; they come back as ordinary responses.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("request could not be built: {0}")]
    InvalidRequest(String),
}
