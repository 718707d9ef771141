//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! types in `maven_api` (which use camelCase on the wire).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role carried by every provider-resolved principal.
pub const PLAYER_ROLE: &str = "player";

/// A player resolved through the Discord provider flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPrincipal {
    /// Canonical identity-store key (the Discord snowflake).
    pub player_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    /// Set to the player id when an active admin grant exists.
    pub admin_id: Option<String>,
}

/// A credential-based store administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminPrincipal {
    pub admin_id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

/// Raw bridged fields, validated into a [`BridgedPrincipal`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgedFields {
    pub player_id: Option<String>,
    pub admin_id: Option<String>,
    pub role: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

/// A principal reconstructed from a verified SSO handshake token.
///
/// At least one of `player_id` / `admin_id` is always set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BridgedFields", into = "BridgedFields")]
pub struct BridgedPrincipal(BridgedFields);

impl BridgedPrincipal {
    /// Returns `None` when neither a player id nor an admin id is present.
    pub fn new(fields: BridgedFields) -> Option<Self> {
        let has_id = |id: &Option<String>| id.as_deref().is_some_and(|s| !s.is_empty());
        if has_id(&fields.player_id) || has_id(&fields.admin_id) {
            Some(Self(fields))
        } else {
            None
        }
    }

    pub fn fields(&self) -> &BridgedFields {
        &self.0
    }

    pub(crate) fn set_admin_id(&mut self, admin_id: Option<String>) {
        self.0.admin_id = admin_id;
    }
}

impl TryFrom<BridgedFields> for BridgedPrincipal {
    type Error = &'static str;

    fn try_from(fields: BridgedFields) -> Result<Self, Self::Error> {
        Self::new(fields).ok_or("bridged principal without player or admin id")
    }
}

impl From<BridgedPrincipal> for BridgedFields {
    fn from(p: BridgedPrincipal) -> Self {
        p.0
    }
}

/// The resolved identity of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Principal {
    Player(PlayerPrincipal),
    Admin(AdminPrincipal),
    Bridged(BridgedPrincipal),
}

impl Principal {
    pub fn role(&self) -> Option<&str> {
        match self {
            Principal::Player(_) => Some(PLAYER_ROLE),
            Principal::Admin(a) => Some(&a.role),
            Principal::Bridged(b) => b.fields().role.as_deref(),
        }
    }

    pub fn player_id(&self) -> Option<&str> {
        match self {
            Principal::Player(p) => Some(&p.player_id),
            Principal::Admin(_) => None,
            Principal::Bridged(b) => b.fields().player_id.as_deref(),
        }
    }

    pub fn admin_id(&self) -> Option<&str> {
        match self {
            Principal::Player(p) => p.admin_id.as_deref(),
            Principal::Admin(a) => Some(&a.admin_id),
            Principal::Bridged(b) => b.fields().admin_id.as_deref(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Principal::Player(p) => p.name.as_deref(),
            Principal::Admin(a) => Some(&a.name),
            Principal::Bridged(b) => b.fields().name.as_deref(),
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Principal::Player(p) => p.email.as_deref(),
            Principal::Admin(a) => Some(&a.email),
            Principal::Bridged(b) => b.fields().email.as_deref(),
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            Principal::Player(p) => p.image.as_deref(),
            Principal::Admin(_) => None,
            Principal::Bridged(b) => b.fields().image.as_deref(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin_id().is_some()
    }

    /// Externally visible projection. Never carries secrets.
    pub fn session_view(&self) -> SessionView {
        SessionView {
            role: self.role().map(str::to_string),
            player_id: self.player_id().map(str::to_string),
            admin_id: self.admin_id().map(str::to_string),
            name: self.name().map(str::to_string),
            email: self.email().map(str::to_string),
            image: self.image().map(str::to_string),
        }
    }
}

/// Session object exposed to the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Profile data supplied by an external provider on login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityProfile {
    pub email: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Stored player identity, keyed by Discord id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub discord_id: Option<String>,
    pub email: Option<String>,
    pub discord_username: Option<String>,
    pub discord_avatar: Option<String>,
    pub minecraft_name: Option<String>,
    pub account_type: String,
    pub verified: bool,
    pub linked_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Account type assigned to freshly created identities.
pub const DEFAULT_ACCOUNT_TYPE: &str = "pirata";

/// Active admin-privilege grant for a Discord id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminGrant {
    pub discord_id: String,
    pub discord_username: Option<String>,
    pub access_level: String,
    pub granted_by: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

/// Input for creating or reactivating an admin grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub discord_id: String,
    pub discord_username: Option<String>,
    pub access_level: String,
    pub granted_by: Option<String>,
}

/// Credential-based admin user, including the password hash.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: String,
}
