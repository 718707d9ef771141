//! Session API: credential and SSO login, session inspection, refresh and
//! logout.

use axum::extract::State;
use axum::{Extension, Json};
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedPrincipal;
use crate::models::{CredentialsRequest, LogoutResponse, SessionResponse, SsoLoginRequest};
use crate::services::session::{current_principal, end, establish};

/// `POST /auth/credentials`: admin login by username and password.
pub async fn credentials_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<CredentialsRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let principal = state
        .authority
        .authorize_credentials(&body.username, &body.password)
        .await?;
    let jar = establish(&state, jar, &principal)?;
    Ok((jar, Json(SessionResponse::authenticated(principal.session_view()))))
}

/// `POST /auth/sso`: establish a session from an SSO handshake token.
pub async fn sso_login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<SsoLoginRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let principal = state.authority.authorize_sso(&body.token)?;
    let jar = establish(&state, jar, &principal)?;
    Ok((jar, Json(SessionResponse::authenticated(principal.session_view()))))
}

/// `GET /auth/session`: the projected session, if any.
pub async fn session_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Json<SessionResponse> {
    match current_principal(&state, &jar) {
        Some(principal) => Json(SessionResponse::authenticated(principal.session_view())),
        None => Json(SessionResponse::anonymous()),
    }
}

/// `POST /auth/session/refresh`: re-check the admin grant and reissue.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let principal = state.authority.refresh(principal).await?;
    let jar = establish(&state, jar, &principal)?;
    Ok((jar, Json(SessionResponse::authenticated(principal.session_view()))))
}

/// `POST /auth/logout`: clear the session cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<LogoutResponse>) {
    (end(&state, jar), Json(LogoutResponse { success: true }))
}
