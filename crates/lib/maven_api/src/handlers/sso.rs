//! Cross-domain SSO handshake endpoints.
//!
//! `/sso/start` runs on the auth center and forwards the browser to a
//! satellite with a short-lived token; `/sso/callback` runs on the
//! satellite and turns that token into a local session. Both are
//! browser-facing, so failures become redirects or an HTML page.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use maven_core::auth::sso::{HandshakeRequest, LoginMode};
use serde::Deserialize;

use crate::AppState;
use crate::services::pages::ErrorPage;
use crate::services::session::{current_principal, establish, found};

#[derive(Debug, Deserialize)]
pub struct StartParams {
    pub redirect: Option<String>,
    pub next: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub token: Option<String>,
    pub next: Option<String>,
}

/// `GET /sso/start?redirect&next&mode`: always answers with a redirect,
/// unless the server itself is misconfigured.
pub async fn start_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<StartParams>,
) -> Response {
    let request = HandshakeRequest {
        redirect: params.redirect,
        next: params.next,
        mode: LoginMode::from_param(params.mode.as_deref()),
    };
    let session = current_principal(&state, &jar);

    match state.sso.start_handshake(session.as_ref(), &request) {
        Ok(outcome) => found(&outcome.location()),
        Err(e) => ErrorPage::from_auth_error(&e).into_response(),
    }
}

/// `GET /sso/callback?token&next`: verify, set the local session, go to
/// `next`.
pub async fn callback_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) else {
        return ErrorPage::login_again().into_response();
    };

    let completed = match state
        .authority
        .complete_handshake(token, params.next.as_deref())
    {
        Ok(completed) => completed,
        Err(e) => return ErrorPage::from_auth_error(&e).into_response(),
    };

    match establish(&state, jar, &completed.principal) {
        Ok(jar) => (jar, found(&completed.next)).into_response(),
        Err(e) => ErrorPage::from_auth_error(&e).into_response(),
    }
}
