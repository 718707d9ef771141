//! Discord login (authorization code + PKCE).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tracing::warn;
use url::form_urlencoded::byte_serialize;

use crate::AppState;
use crate::services::pages::ErrorPage;
use crate::services::session::{establish, found, local_callback};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeParams {
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DiscordCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// `GET /login?callbackUrl`: players log in through Discord.
pub async fn login_page(Query(params): Query<AuthorizeParams>) -> Response {
    let target = match params.callback_url.as_deref() {
        Some(cb) => {
            let encoded: String = byte_serialize(cb.as_bytes()).collect();
            format!("/auth/discord?callbackUrl={encoded}")
        }
        None => "/auth/discord".to_string(),
    };
    found(&target)
}

/// `GET /auth/discord?callbackUrl`: start the OAuth flow.
pub async fn authorize_handler(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let callback = local_callback(
        state.config.auth_center_url.as_deref(),
        params.callback_url.as_deref(),
    );
    match state.discord.authorization_url(callback) {
        Ok(url) => found(url.as_str()),
        Err(e) => ErrorPage::from_auth_error(&e).into_response(),
    }
}

/// `GET /auth/discord/callback?code&state`: finish the flow, resolve the
/// player and set the session.
pub async fn callback_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<DiscordCallbackParams>,
) -> Response {
    if let Some(error) = params.error.as_deref() {
        warn!(error = %error, "discord authorization denied");
        return denied();
    }
    let (Some(code), Some(oauth_state)) = (params.code.as_deref(), params.state.as_deref()) else {
        return denied();
    };

    let login = match state.discord.complete(code, oauth_state).await {
        Ok(login) => login,
        Err(e) => return ErrorPage::from_auth_error(&e).into_response(),
    };

    let principal = match state
        .authority
        .authorize_provider(&login.user.id, &login.user.profile())
        .await
    {
        Ok(principal) => principal,
        Err(e) => return ErrorPage::from_auth_error(&e).into_response(),
    };

    spawn_login_notification(&state, login.user.id.clone());

    match establish(&state, jar, &principal) {
        Ok(jar) => (jar, found(&login.callback_url)).into_response(),
        Err(e) => ErrorPage::from_auth_error(&e).into_response(),
    }
}

fn denied() -> Response {
    ErrorPage {
        status: StatusCode::UNAUTHORIZED,
        title: "Login cancelled",
        message: "Discord login was cancelled or could not be completed.",
        action_href: "/login".into(),
        action_label: "Try again",
    }
    .into_response()
}

/// Fire-and-forget webhook describing the player.
fn spawn_login_notification(state: &AppState, discord_id: String) {
    if !state.notifier.is_enabled() {
        return;
    }
    let store = state.store.clone();
    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        match store.find_identity(&discord_id).await {
            Ok(Some(player)) => notifier.notify_login(&player).await,
            Ok(None) => {}
            Err(e) => warn!(discord_id = %discord_id, "login notification lookup failed: {e}"),
        }
    });
}
