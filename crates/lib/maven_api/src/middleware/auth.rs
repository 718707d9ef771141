//! Session middleware: resolve the cookie principal and gate admin routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use maven_core::models::auth::Principal;

use crate::AppState;
use crate::error::AppError;
use crate::services::session::current_principal;

/// The session principal, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

/// Rejects requests without a valid session cookie.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = current_principal(&state, &jar)
        .ok_or_else(|| AppError::Unauthorized("Not logged in".into()))?;
    request
        .extensions_mut()
        .insert(AuthenticatedPrincipal(principal));
    Ok(next.run(request).await)
}

/// Like [`require_session`], but the principal must carry an admin id.
pub async fn require_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = current_principal(&state, &jar)
        .ok_or_else(|| AppError::Unauthorized("Not logged in".into()))?;
    if !principal.is_admin() {
        return Err(AppError::Forbidden("Admin access required".into()));
    }
    request
        .extensions_mut()
        .insert(AuthenticatedPrincipal(principal));
    Ok(next.run(request).await)
}
