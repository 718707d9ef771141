//! Session cookie plumbing shared by handlers and middleware.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use maven_core::auth::AuthError;
use maven_core::auth::redirect::{SAFE_DEFAULT, safe_next_path};
use maven_core::auth::session::SessionTokens;
use maven_core::models::auth::Principal;
use tracing::debug;
use url::Url;

use crate::AppState;
use crate::services::cookies::{SESSION_COOKIE, clear_session_cookie, session_cookie};

/// The principal sealed in the request's session cookie, if valid.
pub fn current_principal(state: &AppState, jar: &CookieJar) -> Option<Principal> {
    let token = jar.get(SESSION_COOKIE)?.value();
    match state.sessions.verify(token) {
        Ok(principal) => Some(principal),
        Err(e) => {
            debug!("ignoring session cookie: {e}");
            None
        }
    }
}

/// Seal `principal` into a fresh session cookie.
pub fn establish(
    state: &AppState,
    jar: CookieJar,
    principal: &Principal,
) -> Result<CookieJar, AuthError> {
    let token = state.sessions.issue(principal)?;
    Ok(jar.add(session_cookie(
        &token,
        SessionTokens::max_age_secs(),
        state.config.cookie_secure,
    )))
}

/// Drop the session cookie.
pub fn end(state: &AppState, jar: CookieJar) -> CookieJar {
    jar.add(clear_session_cookie(state.config.cookie_secure))
}

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Resolve a post-login callback to a local path.
///
/// Site-relative paths are sanitized; absolute URLs are accepted only when
/// they point back at the auth center itself.
pub fn local_callback(auth_center_url: Option<&str>, raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return SAFE_DEFAULT.to_string();
    };
    if raw.starts_with('/') {
        return safe_next_path(Some(raw));
    }

    let same_origin = auth_center_url
        .and_then(|base| Url::parse(base).ok())
        .zip(Url::parse(raw).ok())
        .filter(|(base, target)| base.origin() == target.origin())
        .map(|(_, target)| target);

    match same_origin {
        Some(target) => {
            let path = match target.query() {
                Some(q) => format!("{}?{q}", target.path()),
                None => target.path().to_string(),
            };
            safe_next_path(Some(&path))
        }
        None => SAFE_DEFAULT.to_string(),
    }
}
