//! Wire types for the authentication endpoints

use serde::{Deserialize, Serialize};

/// `POST /account/login` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub health_id: String,
    pub password: String,
}

/// `POST /account/login` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub refresh_token: String,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: i64,
}

/// `POST /token/refresh` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `POST /token/refresh` response body.
///
/// The backend may or may not rotate the refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
}
