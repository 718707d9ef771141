//! API server configuration.

use maven_core::auth::discord::DiscordSettings;
use maven_core::auth::sso::SsoSettings;

/// Internal domain appended to bare admin usernames.
pub const DEFAULT_ADMIN_EMAIL_DOMAIN: &str = "mavenmc.local";

const DISCORD_CALLBACK_PATH: &str = "/auth/discord/callback";

/// Configuration for the auth center.
///
/// Secrets are optional here; components that need a missing one fail with
/// a configuration error when used.
#[derive(Clone, Debug, Default)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Session-cookie signing secret.
    pub session_secret: Option<String>,
    /// SSO handshake signing secret.
    pub sso_secret: Option<String>,
    /// Admin-link signing secret.
    pub admin_link_secret: Option<String>,
    /// Public origin of the auth center.
    pub auth_center_url: Option<String>,
    /// `iss` of SSO tokens.
    pub sso_issuer: Option<String>,
    /// Root domain that SSO redirects may target.
    pub sso_allowed_domain: Option<String>,
    pub admin_email_domain: String,
    pub discord_client_id: Option<String>,
    pub discord_client_secret: Option<String>,
    pub discord_redirect_uri: Option<String>,
    /// Login notification webhook; disabled when unset.
    pub discord_webhook_url: Option<String>,
    /// Mark the session cookie `Secure`.
    pub cookie_secure: bool,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                                | Default                                   |
    /// |-----------------------------------------|-------------------------------------------|
    /// | `BIND_ADDR`                             | `127.0.0.1:3000`                          |
    /// | `DATABASE_URL`                          | `postgres://localhost:5432/maven`         |
    /// | `SESSION_SECRET` / `NEXTAUTH_SECRET`    | none                                      |
    /// | `SSO_JWT_SECRET`                        | none                                      |
    /// | `ADMIN_LINK_SECRET`                     | session secret                            |
    /// | `AUTH_CENTER_URL`                       | none                                      |
    /// | `SSO_ISSUER`                            | `AUTH_CENTER_URL`                         |
    /// | `SSO_ALLOWED_DOMAIN`                    | none                                      |
    /// | `ADMIN_EMAIL_DOMAIN`                    | `mavenmc.local`                           |
    /// | `DISCORD_CLIENT_ID` / `_SECRET`         | none                                      |
    /// | `DISCORD_REDIRECT_URI`                  | `<AUTH_CENTER_URL>/auth/discord/callback` |
    /// | `DISCORD_WEBHOOK_URL`                   | disabled                                  |
    /// | `COOKIE_SECURE`                         | `false`                                   |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let session_secret = var("SESSION_SECRET").or_else(|| var("NEXTAUTH_SECRET"));
        let auth_center_url = var("AUTH_CENTER_URL").map(|u| u.trim_end_matches('/').to_string());
        let discord_redirect_uri = var("DISCORD_REDIRECT_URI").or_else(|| {
            auth_center_url
                .as_deref()
                .map(|base| format!("{base}{DISCORD_CALLBACK_PATH}"))
        });

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".into()),
            pg_connection_url: var("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/maven".into()),
            admin_link_secret: var("ADMIN_LINK_SECRET").or_else(|| session_secret.clone()),
            session_secret,
            sso_secret: var("SSO_JWT_SECRET"),
            sso_issuer: var("SSO_ISSUER").or_else(|| auth_center_url.clone()),
            auth_center_url,
            sso_allowed_domain: var("SSO_ALLOWED_DOMAIN"),
            admin_email_domain: var("ADMIN_EMAIL_DOMAIN")
                .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL_DOMAIN.into()),
            discord_client_id: var("DISCORD_CLIENT_ID"),
            discord_client_secret: var("DISCORD_CLIENT_SECRET"),
            discord_redirect_uri,
            discord_webhook_url: var("DISCORD_WEBHOOK_URL"),
            cookie_secure: var("COOKIE_SECURE")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
        }
    }

    pub fn sso_settings(&self) -> SsoSettings {
        SsoSettings {
            secret: self.sso_secret.clone(),
            issuer: self.sso_issuer.clone(),
            auth_center_url: self.auth_center_url.clone(),
            allowed_domain: self.sso_allowed_domain.clone(),
        }
    }

    pub fn discord_settings(&self) -> DiscordSettings {
        DiscordSettings {
            client_id: self.discord_client_id.clone(),
            client_secret: self.discord_client_secret.clone(),
            redirect_uri: self.discord_redirect_uri.clone(),
        }
    }
}
