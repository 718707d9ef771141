//! Session authority.
//!
//! Resolves a [`Principal`] from one of three entry points (admin
//! credentials, Discord provider login, bridged SSO token), re-checks admin
//! grants on explicit refresh, and seals principals into session tokens.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::AuthError;
use super::admin_link::AdminLinkClaims;
use super::password::{verify_against_dummy, verify_password};
use super::redirect::safe_next_path;
use super::sso::SsoBridge;
use super::token::{TokenCodec, TokenScope};
use crate::identity::IdentityStore;
use crate::models::auth::{
    AdminPrincipal, GrantRequest, IdentityProfile, PlayerPrincipal, Principal,
};

/// Audience namespace of session tokens.
pub const SESSION_AUDIENCE: &str = "maven-session";

/// Session lifetime: 30 days.
pub const SESSION_TTL_DAYS: i64 = 30;

/// Name shown for credential admins without one.
const DEFAULT_ADMIN_NAME: &str = "Admin";

/// Derive the admin lookup email from a login username.
pub fn admin_email(username: &str, internal_domain: &str) -> String {
    if username.contains('@') {
        username.to_string()
    } else {
        format!("{username}@{internal_domain}")
    }
}

/// Result of a completed SSO handshake on the satellite side.
#[derive(Debug, Clone)]
pub struct CompletedHandshake {
    pub principal: Principal,
    /// Site-relative path to navigate to.
    pub next: String,
}

/// Orchestrates principal resolution for every login entry point.
pub struct SessionAuthority {
    store: Arc<dyn IdentityStore>,
    sso: Arc<SsoBridge>,
    internal_domain: String,
}

impl SessionAuthority {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        sso: Arc<SsoBridge>,
        internal_domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sso,
            internal_domain: internal_domain.into(),
        }
    }

    /// Admin login by username (or email) and password.
    ///
    /// Unknown user and wrong password both yield `CredentialError`.
    pub async fn authorize_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Principal, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::CredentialError);
        }

        let email = admin_email(username, &self.internal_domain);
        let Some(admin) = self.store.find_admin_user_by_email(&email).await? else {
            verify_against_dummy(password);
            return Err(AuthError::CredentialError);
        };

        match verify_password(password, &admin.password_hash) {
            Ok(true) => {}
            Ok(false) => return Err(AuthError::CredentialError),
            Err(e) => {
                warn!(admin_id = %admin.id, error = %e, "stored admin password hash is unreadable");
                return Err(AuthError::CredentialError);
            }
        }

        info!(admin_id = %admin.id, "admin credentials login");
        Ok(Principal::Admin(AdminPrincipal {
            name: admin
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string()),
            admin_id: admin.id,
            email: admin.email,
            role: admin.role,
        }))
    }

    /// Discord login: upsert the identity, then check the admin grant.
    ///
    /// The only path that writes to the identity store.
    pub async fn authorize_provider(
        &self,
        provider_account_id: &str,
        profile: &IdentityProfile,
    ) -> Result<Principal, AuthError> {
        if provider_account_id.is_empty() {
            return Err(AuthError::Provider("provider returned no account id".into()));
        }

        let player_id = self
            .store
            .upsert_identity(provider_account_id, profile)
            .await?;

        let admin_id = match self.store.find_admin_grant(&player_id).await? {
            Some(_) => {
                if let Err(e) = self.store.touch_admin_last_login(&player_id).await {
                    warn!(player_id = %player_id, "failed to stamp admin last login: {e}");
                }
                Some(player_id.clone())
            }
            None => None,
        };

        info!(player_id = %player_id, admin = admin_id.is_some(), "provider login");
        Ok(Principal::Player(PlayerPrincipal {
            player_id,
            name: profile.name.clone(),
            email: profile.email.clone(),
            image: profile.image.clone(),
            admin_id,
        }))
    }

    /// SSO login: trust is delegated entirely to the token signature.
    pub fn authorize_sso(&self, token: &str) -> Result<Principal, AuthError> {
        self.sso.verify_token(token)
    }

    /// Satellite side of the handshake: verify the token and pick the
    /// post-login destination.
    pub fn complete_handshake(
        &self,
        token: &str,
        next: Option<&str>,
    ) -> Result<CompletedHandshake, AuthError> {
        let principal = self.authorize_sso(token)?;
        debug!(
            player_id = principal.player_id().unwrap_or_default(),
            admin = principal.is_admin(),
            "sso handshake completed"
        );
        Ok(CompletedHandshake {
            principal,
            next: safe_next_path(next),
        })
    }

    /// Re-run the admin-grant check for the principal's player id.
    ///
    /// Credential admins are returned unchanged.
    pub async fn refresh(&self, principal: Principal) -> Result<Principal, AuthError> {
        match principal {
            Principal::Player(mut player) => {
                player.admin_id = self.grant_admin_id(&player.player_id).await?;
                Ok(Principal::Player(player))
            }
            Principal::Bridged(mut bridged) => {
                let Some(player_id) = bridged.fields().player_id.clone() else {
                    return Ok(Principal::Bridged(bridged));
                };
                bridged.set_admin_id(self.grant_admin_id(&player_id).await?);
                Ok(Principal::Bridged(bridged))
            }
            admin @ Principal::Admin(_) => Ok(admin),
        }
    }

    /// Redeem an admin-link: grant admin access to the session's Discord
    /// identity on behalf of the linking admin, then refresh the session.
    pub async fn link_admin(
        &self,
        session: Principal,
        link: &AdminLinkClaims,
    ) -> Result<Principal, AuthError> {
        let Some(player_id) = session.player_id().map(str::to_string) else {
            return Err(AuthError::ValidationError(
                "a Discord session is required to link admin access".into(),
            ));
        };

        self.store
            .upsert_admin_grant(&GrantRequest {
                discord_id: player_id.clone(),
                discord_username: session.name().map(str::to_string),
                access_level: link.access_level().to_string(),
                granted_by: Some(link.admin_id.clone()),
            })
            .await?;
        info!(player_id = %player_id, granted_by = %link.admin_id, "admin access linked");

        self.refresh(session).await
    }

    async fn grant_admin_id(&self, player_id: &str) -> Result<Option<String>, AuthError> {
        Ok(self
            .store
            .find_admin_grant(player_id)
            .await?
            .map(|_| player_id.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    principal: Principal,
}

/// Seals principals into the session cookie value.
#[derive(Debug)]
pub struct SessionTokens {
    codec: Result<TokenCodec, String>,
}

impl SessionTokens {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            codec: TokenCodec::from_config(secret, "SESSION_SECRET").map_err(|e| e.to_string()),
        }
    }

    fn codec(&self) -> Result<&TokenCodec, AuthError> {
        self.codec
            .as_ref()
            .map_err(|e| AuthError::Configuration(e.clone()))
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        let subject = match (principal.player_id(), principal.admin_id()) {
            (Some(p), _) => format!("player:{p}"),
            (None, Some(a)) => format!("admin:{a}"),
            (None, None) => return Err(AuthError::Internal("principal without id".into())),
        };
        self.codec()?.issue(
            &SessionClaims {
                principal: principal.clone(),
            },
            TokenScope::new(SESSION_AUDIENCE),
            &subject,
            Duration::days(SESSION_TTL_DAYS),
        )
    }

    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let verified = self
            .codec()?
            .verify::<SessionClaims>(token, TokenScope::new(SESSION_AUDIENCE))?;
        Ok(verified.claims.principal)
    }

    pub fn max_age_secs() -> i64 {
        Duration::days(SESSION_TTL_DAYS).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::auth::sso::SsoSettings;
    use crate::identity::MemoryIdentityStore;

    const ISSUER: &str = "https://auth.mavenmc.com.br";

    fn bridge() -> Arc<SsoBridge> {
        Arc::new(SsoBridge::new(SsoSettings {
            secret: Some("sso-secret".into()),
            issuer: Some(ISSUER.into()),
            auth_center_url: Some(ISSUER.into()),
            allowed_domain: Some("mavenmc.com.br".into()),
        }))
    }

    fn authority(store: Arc<MemoryIdentityStore>) -> SessionAuthority {
        SessionAuthority::new(store, bridge(), "mavenmc.local")
    }

    fn discord_profile() -> IdentityProfile {
        IdentityProfile {
            email: Some("a@b.com".into()),
            name: Some("Foo".into()),
            image: None,
        }
    }

    async fn grant(store: &MemoryIdentityStore, id: &str) {
        store
            .upsert_admin_grant(&GrantRequest {
                discord_id: id.into(),
                discord_username: None,
                access_level: "admin".into(),
                granted_by: None,
            })
            .await
            .unwrap();
    }

    #[test]
    fn admin_email_derivation() {
        assert_eq!(admin_email("root", "mavenmc.local"), "root@mavenmc.local");
        assert_eq!(admin_email("x@y.z", "mavenmc.local"), "x@y.z");
    }

    #[tokio::test]
    async fn first_discord_login_yields_plain_player() {
        let store = Arc::new(MemoryIdentityStore::new());
        let principal = authority(store.clone())
            .authorize_provider("D1", &discord_profile())
            .await
            .unwrap();

        let view = principal.session_view();
        assert_eq!(view.role.as_deref(), Some("player"));
        assert_eq!(view.player_id.as_deref(), Some("D1"));
        assert!(view.admin_id.is_none());
        assert!(store.find_identity("D1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn granted_player_gets_admin_id_and_last_login() {
        let store = Arc::new(MemoryIdentityStore::new());
        grant(&store, "D1").await;
        let principal = authority(store.clone())
            .authorize_provider("D1", &discord_profile())
            .await
            .unwrap();
        assert_eq!(principal.admin_id(), Some("D1"));
        assert_eq!(principal.role(), Some("player"));
        let grant = store.find_admin_grant("D1").await.unwrap().unwrap();
        assert!(grant.last_login.is_some());
    }

    #[tokio::test]
    async fn credential_login_and_generic_failure() {
        let store = Arc::new(MemoryIdentityStore::new());
        let hash = hash_password("hunter22").unwrap();
        let id = store
            .create_admin_user("root@mavenmc.local", None, &hash, "owner")
            .await
            .unwrap();
        let authority = authority(store);

        let principal = authority.authorize_credentials("root", "hunter22").await.unwrap();
        let view = principal.session_view();
        assert_eq!(view.role.as_deref(), Some("owner"));
        assert_eq!(view.admin_id.as_deref(), Some(id.as_str()));
        assert_eq!(view.name.as_deref(), Some("Admin"));
        assert!(view.player_id.is_none());

        let wrong = authority.authorize_credentials("root", "nope").await.unwrap_err();
        let unknown = authority.authorize_credentials("ghost", "hunter22").await.unwrap_err();
        assert!(matches!(wrong, AuthError::CredentialError));
        assert!(matches!(unknown, AuthError::CredentialError));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn unreadable_hash_fails_like_unknown_user() {
        let store = Arc::new(MemoryIdentityStore::new());
        store
            .create_admin_user("legacy@mavenmc.local", None, "not-bcrypt", "admin")
            .await
            .unwrap();
        let authority = authority(store);

        let legacy = authority.authorize_credentials("legacy", "pw").await.unwrap_err();
        let unknown = authority.authorize_credentials("ghost", "pw").await.unwrap_err();
        assert!(matches!(legacy, AuthError::CredentialError));
        assert_eq!(legacy.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn full_email_username_is_used_verbatim() {
        let store = Arc::new(MemoryIdentityStore::new());
        let hash = hash_password("pw").unwrap();
        store
            .create_admin_user("staff@mavenmc.com.br", Some("Staff"), &hash, "admin")
            .await
            .unwrap();
        let principal = authority(store)
            .authorize_credentials("staff@mavenmc.com.br", "pw")
            .await
            .unwrap();
        assert_eq!(principal.name(), Some("Staff"));
    }

    #[tokio::test]
    async fn refresh_adds_and_removes_admin() {
        let store = Arc::new(MemoryIdentityStore::new());
        let authority = authority(store.clone());
        let principal = authority
            .authorize_provider("D1", &discord_profile())
            .await
            .unwrap();
        assert!(!principal.is_admin());

        grant(&store, "D1").await;
        let principal = authority.refresh(principal).await.unwrap();
        assert_eq!(principal.admin_id(), Some("D1"));

        store.revoke_admin_grant("D1", None).await.unwrap();
        let principal = authority.refresh(principal).await.unwrap();
        assert!(!principal.is_admin());
    }

    #[tokio::test]
    async fn refresh_rechecks_bridged_players() {
        let store = Arc::new(MemoryIdentityStore::new());
        let authority = authority(store.clone());
        grant(&store, "D1").await;
        let player = authority
            .authorize_provider("D1", &discord_profile())
            .await
            .unwrap();
        let token = bridge().issue_token(&player).unwrap();
        let bridged = authority.authorize_sso(&token).unwrap();
        assert_eq!(bridged.admin_id(), Some("D1"));

        store.revoke_admin_grant("D1", None).await.unwrap();
        let bridged = authority.refresh(bridged).await.unwrap();
        assert!(!bridged.is_admin());
        assert_eq!(bridged.player_id(), Some("D1"));
    }

    #[tokio::test]
    async fn link_admin_grants_and_refreshes() {
        let store = Arc::new(MemoryIdentityStore::new());
        let authority = authority(store.clone());
        let player = authority
            .authorize_provider("D1", &discord_profile())
            .await
            .unwrap();

        let link = AdminLinkClaims {
            admin_id: "7".into(),
            role: None,
        };
        let linked = authority.link_admin(player, &link).await.unwrap();
        assert_eq!(linked.admin_id(), Some("D1"));

        let grant = store.find_admin_grant("D1").await.unwrap().unwrap();
        assert_eq!(grant.granted_by.as_deref(), Some("7"));
        assert_eq!(grant.access_level, "admin");
        assert_eq!(grant.discord_username.as_deref(), Some("Foo"));
    }

    #[tokio::test]
    async fn link_admin_requires_player_session() {
        let authority = authority(Arc::new(MemoryIdentityStore::new()));
        let admin = Principal::Admin(AdminPrincipal {
            admin_id: "1".into(),
            name: "Admin".into(),
            email: "root@mavenmc.local".into(),
            role: "owner".into(),
        });
        let link = AdminLinkClaims {
            admin_id: "1".into(),
            role: Some("owner".into()),
        };
        assert!(matches!(
            authority.link_admin(admin, &link).await,
            Err(AuthError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn sso_login_does_not_touch_store() {
        let store = Arc::new(MemoryIdentityStore::new());
        let authority = authority(store.clone());
        let source = Principal::Player(PlayerPrincipal {
            player_id: "D9".into(),
            name: None,
            email: None,
            image: None,
            admin_id: None,
        });
        let token = bridge().issue_token(&source).unwrap();
        let completed = authority
            .complete_handshake(&token, Some("https://evil.com"))
            .unwrap();
        assert_eq!(completed.principal.player_id(), Some("D9"));
        assert_eq!(completed.next, "/");
        assert_eq!(store.identity_count().await, 0);
    }

    #[test]
    fn tampered_sso_token_fails_closed() {
        let authority = authority(Arc::new(MemoryIdentityStore::new()));
        assert!(matches!(
            authority.complete_handshake("garbage", None),
            Err(AuthError::TokenInvalid(_))
        ));
    }

    #[test]
    fn session_tokens_round_trip() {
        let tokens = SessionTokens::new(Some("session-secret"));
        let principal = Principal::Admin(AdminPrincipal {
            admin_id: "1".into(),
            name: "Admin".into(),
            email: "root@mavenmc.local".into(),
            role: "owner".into(),
        });
        let token = tokens.issue(&principal).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), principal);

        let other = SessionTokens::new(Some("other"));
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn sso_token_is_not_a_session() {
        let tokens = SessionTokens::new(Some("sso-secret"));
        let principal = Principal::Admin(AdminPrincipal {
            admin_id: "1".into(),
            name: "Admin".into(),
            email: "root@mavenmc.local".into(),
            role: "owner".into(),
        });
        let sso_token = bridge().issue_token(&principal).unwrap();
        assert!(tokens.verify(&sso_token).is_err());
    }
}
