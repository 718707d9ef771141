//! Discord OAuth provider.
//!
//! Authorization-code flow with PKCE. Pending logins are kept in memory,
//! keyed by the `state` parameter, until the callback arrives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use super::AuthError;
use crate::models::auth::IdentityProfile;

pub const DISCORD_AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
pub const DISCORD_TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
pub const DISCORD_USER_URL: &str = "https://discord.com/api/users/@me";
const DISCORD_AVATAR_BASE: &str = "https://cdn.discordapp.com/avatars";
const DISCORD_SCOPES: &str = "identify email guilds";

/// How long a started login may wait for its callback.
const STATE_TTL: Duration = Duration::from_secs(600);

/// Upper bound on logins waiting for their callback.
pub const MAX_PENDING_LOGINS: usize = 10_000;

// =============================================================================
// PKCE helpers
// =============================================================================

fn random_url_safe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a PKCE code verifier (43 URL-safe chars).
pub fn generate_code_verifier() -> String {
    random_url_safe(32)
}

/// S256 code challenge for a verifier.
pub fn compute_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Opaque CSRF state parameter.
pub fn generate_state() -> String {
    random_url_safe(24)
}

// =============================================================================
// Pending login store
// =============================================================================

/// A login started at `/auth/discord`, waiting for its callback.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub pkce_verifier: String,
    /// Where to send the browser once the session is established.
    pub callback_url: String,
    pub created_at: Instant,
}

#[derive(Debug)]
pub struct LoginStateStore {
    states: DashMap<String, PendingLogin>,
    capacity: usize,
}

impl Default for LoginStateStore {
    fn default() -> Self {
        Self::with_capacity(MAX_PENDING_LOGINS)
    }
}

impl LoginStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: DashMap::new(),
            capacity,
        }
    }

    /// Record a started login. When the store is full, expired entries are
    /// evicted first; if it is still full the login is refused.
    pub fn insert(&self, state: String, pending: PendingLogin) -> Result<(), AuthError> {
        if self.states.len() >= self.capacity {
            self.cleanup();
            if self.states.len() >= self.capacity {
                warn!(capacity = self.capacity, "pending discord login store is full");
                return Err(AuthError::Provider("too many pending logins".into()));
            }
        }
        self.states.insert(state, pending);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Remove and return a pending login; `None` if unknown or expired.
    pub fn take(&self, state: &str) -> Option<PendingLogin> {
        let (_, pending) = self.states.remove(state)?;
        if pending.created_at.elapsed() > STATE_TTL {
            return None;
        }
        Some(pending)
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        self.states.retain(|_, v| v.created_at.elapsed() <= STATE_TTL);
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                store.cleanup();
            }
        })
    }
}

// =============================================================================
// Discord API
// =============================================================================

#[derive(Debug, Deserialize)]
struct DiscordTokenResponse {
    access_token: String,
}

/// Subset of `GET /users/@me`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl DiscordUser {
    pub fn avatar_url(&self) -> Option<String> {
        self.avatar
            .as_deref()
            .map(|hash| format!("{DISCORD_AVATAR_BASE}/{}/{hash}.png", self.id))
    }

    pub fn profile(&self) -> IdentityProfile {
        IdentityProfile {
            email: self.email.clone(),
            name: Some(self.username.clone()),
            image: self.avatar_url(),
        }
    }
}

/// OAuth client configuration.
#[derive(Debug, Clone, Default)]
pub struct DiscordSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

/// A completed Discord login.
#[derive(Debug, Clone)]
pub struct DiscordLogin {
    pub user: DiscordUser,
    pub callback_url: String,
}

pub struct DiscordOAuth {
    settings: DiscordSettings,
    states: Arc<LoginStateStore>,
    client: reqwest::Client,
}

impl DiscordOAuth {
    pub fn new(settings: DiscordSettings, states: Arc<LoginStateStore>) -> Self {
        Self {
            settings,
            states,
            client: reqwest::Client::new(),
        }
    }

    fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AuthError> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthError::Configuration(format!("missing {name}")))
    }

    /// Record a pending login and build the Discord authorize URL.
    pub fn authorization_url(&self, callback_url: String) -> Result<Url, AuthError> {
        let client_id = Self::require(&self.settings.client_id, "DISCORD_CLIENT_ID")?;
        let redirect_uri = Self::require(&self.settings.redirect_uri, "DISCORD_REDIRECT_URI")?;

        let state = generate_state();
        let verifier = generate_code_verifier();
        let challenge = compute_code_challenge(&verifier);

        let mut url = Url::parse(DISCORD_AUTHORIZE_URL)
            .map_err(|e| AuthError::Internal(format!("authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", DISCORD_SCOPES)
            .append_pair("state", &state)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256");

        self.states.insert(
            state,
            PendingLogin {
                pkce_verifier: verifier,
                callback_url,
                created_at: Instant::now(),
            },
        )?;
        Ok(url)
    }

    /// Redeem the callback: check state, exchange the code, fetch the user.
    pub async fn complete(&self, code: &str, state: &str) -> Result<DiscordLogin, AuthError> {
        let pending = self
            .states
            .take(state)
            .ok_or_else(|| AuthError::Provider("unknown or expired login state".into()))?;

        let access_token = self.exchange_code(code, &pending.pkce_verifier).await?;
        let user = self.fetch_user(&access_token).await?;
        debug!(discord_id = %user.id, "discord profile fetched");

        Ok(DiscordLogin {
            user,
            callback_url: pending.callback_url,
        })
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<String, AuthError> {
        let client_id = Self::require(&self.settings.client_id, "DISCORD_CLIENT_ID")?;
        let client_secret = Self::require(&self.settings.client_secret, "DISCORD_CLIENT_SECRET")?;
        let redirect_uri = Self::require(&self.settings.redirect_uri, "DISCORD_REDIRECT_URI")?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ];

        let resp = self
            .client
            .post(DISCORD_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("token exchange failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AuthError::Provider(format!(
                "token exchange HTTP {status}"
            )));
        }

        resp.json::<DiscordTokenResponse>()
            .await
            .map(|t| t.access_token)
            .map_err(|e| AuthError::Provider(format!("token response parse error: {e}")))
    }

    async fn fetch_user(&self, access_token: &str) -> Result<DiscordUser, AuthError> {
        let resp = self
            .client
            .get(DISCORD_USER_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("profile request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AuthError::Provider(format!("profile HTTP {status}")));
        }

        resp.json::<DiscordUser>()
            .await
            .map_err(|e| AuthError::Provider(format!("profile parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DiscordSettings {
        DiscordSettings {
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            redirect_uri: Some("https://mavenmc.com.br/auth/discord/callback".into()),
        }
    }

    #[test]
    fn code_challenge_matches_rfc7636_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            compute_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn verifier_and_state_are_url_safe() {
        let verifier = generate_code_verifier();
        assert!(verifier.len() >= 43);
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn authorization_url_records_pending_login() {
        let states = Arc::new(LoginStateStore::new());
        let oauth = DiscordOAuth::new(settings(), states.clone());
        let url = oauth.authorization_url("/forum".into()).unwrap();

        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "scope" && v == "identify email guilds"));

        let pending = states.take(&state).unwrap();
        assert_eq!(pending.callback_url, "/forum");
        assert!(states.take(&state).is_none());
    }

    #[test]
    fn missing_client_id_is_configuration_error() {
        let oauth = DiscordOAuth::new(DiscordSettings::default(), Arc::new(LoginStateStore::new()));
        assert!(matches!(
            oauth.authorization_url("/".into()),
            Err(AuthError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn unknown_state_is_rejected_before_any_request() {
        let oauth = DiscordOAuth::new(settings(), Arc::new(LoginStateStore::new()));
        assert!(matches!(
            oauth.complete("code", "never-issued").await,
            Err(AuthError::Provider(_))
        ));
    }

    /// `None` when the monotonic clock is younger than `secs`.
    fn aged(secs: u64) -> Option<Instant> {
        Instant::now().checked_sub(Duration::from_secs(secs))
    }

    #[test]
    fn expired_state_is_dropped() {
        let Some(created_at) = aged(700) else {
            return;
        };
        let states = LoginStateStore::new();
        states.insert(
            "old".into(),
            PendingLogin {
                pkce_verifier: "v".into(),
                callback_url: "/".into(),
                created_at,
            },
        )
        .unwrap();
        assert!(states.take("old").is_none());
    }

    #[test]
    fn cleanup_keeps_fresh_entries() {
        let Some(stale) = aged(700) else {
            return;
        };
        let states = LoginStateStore::new();
        for (key, created_at) in [("fresh", Instant::now()), ("stale", stale)] {
            states.insert(
                key.into(),
                PendingLogin {
                    pkce_verifier: "v".into(),
                    callback_url: "/".into(),
                    created_at,
                },
            )
            .unwrap();
        }
        states.cleanup();
        assert!(states.take("fresh").is_some());
        assert!(states.take("stale").is_none());
    }

    fn pending() -> PendingLogin {
        PendingLogin {
            pkce_verifier: "v".into(),
            callback_url: "/".into(),
            created_at: Instant::now(),
        }
    }

    #[test]
    fn full_store_refuses_new_logins() {
        let states = LoginStateStore::with_capacity(2);
        states.insert("a".into(), pending()).unwrap();
        states.insert("b".into(), pending()).unwrap();
        assert!(matches!(
            states.insert("c".into(), pending()),
            Err(AuthError::Provider(_))
        ));
        assert_eq!(states.len(), 2);

        // A redeemed login frees its slot.
        assert!(states.take("a").is_some());
        states.insert("c".into(), pending()).unwrap();
    }

    #[test]
    fn full_store_evicts_expired_before_refusing() {
        let Some(stale) = aged(700) else {
            return;
        };
        let states = LoginStateStore::with_capacity(1);
        states
            .insert(
                "stale".into(),
                PendingLogin {
                    created_at: stale,
                    ..pending()
                },
            )
            .unwrap();
        states.insert("fresh".into(), pending()).unwrap();
        assert_eq!(states.len(), 1);
        assert!(states.take("fresh").is_some());
    }

    #[test]
    fn authorization_url_fails_when_store_is_full() {
        let oauth = DiscordOAuth::new(settings(), Arc::new(LoginStateStore::with_capacity(1)));
        assert!(oauth.authorization_url("/".into()).is_ok());
        assert!(oauth.authorization_url("/".into()).is_err());
    }

    #[test]
    fn profile_maps_avatar_to_cdn_url() {
        let user: DiscordUser = serde_json::from_value(serde_json::json!({
            "id": "80351110224678912",
            "username": "nelly",
            "avatar": "8342729096ea3675442027381ff50dfe",
            "email": "nelly@discord.com",
            "verified": true
        }))
        .unwrap();
        let profile = user.profile();
        assert_eq!(profile.name.as_deref(), Some("nelly"));
        assert_eq!(
            profile.image.as_deref(),
            Some("https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png")
        );

        let no_avatar = DiscordUser {
            avatar: None,
            ..user
        };
        assert!(no_avatar.profile().image.is_none());
    }
}
