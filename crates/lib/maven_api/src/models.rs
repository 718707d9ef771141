//! Request and response bodies (camelCase on the wire).

use maven_core::models::auth::SessionView;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SsoLoginRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionView>,
}

impl SessionResponse {
    pub fn authenticated(view: SessionView) -> Self {
        Self {
            authenticated: true,
            session: Some(view),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            session: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTokenResponse {
    pub token: String,
    /// Page that redeems the token.
    pub url: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAdminRequest {
    pub discord_id: String,
    #[serde(default)]
    pub discord_username: Option<String>,
    #[serde(default)]
    pub access_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAdminRequest {
    pub discord_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResponse {
    pub discord_id: String,
    pub active: bool,
}
