//! Wire types for the auth service endpoints

use authflow_core::User;
use serde::{Deserialize, Serialize};

/// Paths consumed on the remote auth service
pub mod paths {
    pub const LOGIN: &str = "/auth/login/";
    pub const REGISTER: &str = "/auth/register/";
    pub const TOKEN_REFRESH: &str = "/auth/token/refresh/";
    pub const PROFILE: &str = "/auth/profile/";
    pub const LOGOUT: &str = "/auth/logout/";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login/registration response.
///
/// In header-bearer deployments the server delivers the token pair in the
/// body; in cookie deployments the fields are absent and credentials
/// arrive as Set-Cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

/// Refresh endpoint response. `refresh` is present only when the server
/// rotates the refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
