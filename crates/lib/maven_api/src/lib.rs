//! # maven_api
//!
//! HTTP surface of the Maven auth center.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use maven_core::auth::admin_link::AdminLinkTokens;
use maven_core::auth::discord::{DiscordOAuth, LoginStateStore};
use maven_core::auth::session::{SessionAuthority, SessionTokens};
use maven_core::auth::sso::SsoBridge;
use maven_core::identity::IdentityStore;
use maven_core::notify::LoginNotifier;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{admin, admin_link, auth, discord, sso};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn IdentityStore>,
    pub authority: Arc<SessionAuthority>,
    pub sso: Arc<SsoBridge>,
    pub sessions: Arc<SessionTokens>,
    pub admin_links: Arc<AdminLinkTokens>,
    pub discord: Arc<DiscordOAuth>,
    /// Pending Discord logins; the server spawns its cleanup task.
    pub login_states: Arc<LoginStateStore>,
    pub notifier: LoginNotifier,
}

impl AppState {
    /// Wire every component from one configuration object.
    pub fn new(config: ApiConfig, store: Arc<dyn IdentityStore>) -> Self {
        let sso = Arc::new(SsoBridge::new(config.sso_settings()));
        let authority = Arc::new(SessionAuthority::new(
            store.clone(),
            sso.clone(),
            config.admin_email_domain.clone(),
        ));
        let login_states = Arc::new(LoginStateStore::new());
        Self {
            sessions: Arc::new(SessionTokens::new(config.session_secret.as_deref())),
            admin_links: Arc::new(AdminLinkTokens::new(config.admin_link_secret.as_deref())),
            discord: Arc::new(DiscordOAuth::new(
                config.discord_settings(),
                login_states.clone(),
            )),
            notifier: LoginNotifier::new(config.discord_webhook_url.clone()),
            login_states,
            authority,
            sso,
            store,
            config,
        }
    }
}

/// Run embedded database migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    maven_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // Public routes (no session required)
    let public = Router::new()
        .route("/sso/start", get(sso::start_handler))
        .route("/sso/callback", get(sso::callback_handler))
        .route("/admin-link", get(admin_link::admin_link_page))
        .route("/login", get(discord::login_page))
        .route("/auth/discord", get(discord::authorize_handler))
        .route("/auth/discord/callback", get(discord::callback_handler))
        .route("/auth/credentials", post(auth::credentials_handler))
        .route("/auth/sso", post(auth::sso_login_handler))
        .route("/auth/session", get(auth::session_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Any logged-in principal
    let session = Router::new()
        .route("/auth/session/refresh", post(auth::refresh_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_session,
        ));

    // Admins only
    let admin = Router::new()
        .route("/admin/link-token", post(admin_link::issue_link_token_handler))
        .route("/admin/grants", post(admin::grant_handler))
        .route("/admin/grants/revoke", post(admin::revoke_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin,
        ));

    Router::new()
        .merge(public)
        .merge(session)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
