//! Admin-link tokens.
//!
//! A credential-authenticated admin mints one of these and carries it to
//! `/admin-link`, where a Discord-authenticated session redeems it to attach
//! the Discord identity to an admin grant.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::AuthError;
use super::token::{TokenCodec, TokenScope};

/// Audience namespace of admin-link tokens.
pub const ADMIN_LINK_AUDIENCE: &str = "maven-admin-link";

/// Admin-link token lifetime: 10 minutes.
pub const ADMIN_LINK_TTL_SECS: i64 = 10 * 60;

/// Access level used when the token carries no role.
pub const DEFAULT_ACCESS_LEVEL: &str = "admin";

/// Claims carried by an admin-link token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLinkClaims {
    pub admin_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl AdminLinkClaims {
    pub fn access_level(&self) -> &str {
        self.role
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ACCESS_LEVEL)
    }
}

/// Issues and redeems admin-link tokens.
#[derive(Debug)]
pub struct AdminLinkTokens {
    codec: Result<TokenCodec, String>,
}

impl AdminLinkTokens {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            codec: TokenCodec::from_config(secret, "ADMIN_LINK_SECRET").map_err(|e| e.to_string()),
        }
    }

    fn codec(&self) -> Result<&TokenCodec, AuthError> {
        self.codec
            .as_ref()
            .map_err(|e| AuthError::Configuration(e.clone()))
    }

    /// Mint a 10-minute token proving `admin_id`.
    pub fn issue(&self, admin_id: &str, role: Option<&str>) -> Result<String, AuthError> {
        if admin_id.is_empty() {
            return Err(AuthError::ValidationError("admin id is required".into()));
        }
        let claims = AdminLinkClaims {
            admin_id: admin_id.to_string(),
            role: role.map(str::to_string),
        };
        self.codec()?.issue(
            &claims,
            TokenScope::new(ADMIN_LINK_AUDIENCE),
            &format!("admin:{admin_id}"),
            Duration::seconds(ADMIN_LINK_TTL_SECS),
        )
    }

    /// Verify audience, expiry and shape; returns the linking admin.
    pub fn consume(&self, token: &str) -> Result<AdminLinkClaims, AuthError> {
        let verified = self
            .codec()?
            .verify::<AdminLinkClaims>(token, TokenScope::new(ADMIN_LINK_AUDIENCE))?;
        let claims = verified.claims;
        if claims.admin_id.is_empty() || verified.subject != format!("admin:{}", claims.admin_id) {
            return Err(AuthError::TokenInvalid("malformed admin-link token".into()));
        }
        Ok(claims)
    }
}
