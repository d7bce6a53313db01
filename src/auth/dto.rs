use serde::{Deserialize, Serialize};

use crate::users::repo_types::PublicUser;

/// Request body for login. Either handle or email identifies the account.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

/// Fallback body for token refresh when the cookie is absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Data returned after login. Tokens are repeated in the body for clients
/// that cannot keep cookies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
}
