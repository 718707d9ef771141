//! Admin-link: a credential admin hands a short-lived token to a
//! Discord-authenticated browser, which redeems it for an admin grant.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use axum_extra::extract::CookieJar;
use maven_core::auth::admin_link::ADMIN_LINK_TTL_SECS;
use maven_core::models::auth::Principal;
use serde::Deserialize;
use tracing::warn;
use url::form_urlencoded::byte_serialize;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedPrincipal;
use crate::models::LinkTokenResponse;
use crate::services::pages::ErrorPage;
use crate::services::session::{current_principal, establish, found};

const ADMIN_LINK_PATH: &str = "/admin-link";
const ADMIN_HOME: &str = "/admin";
const ADMIN_LOGIN: &str = "/admin-login";

#[derive(Debug, Deserialize)]
pub struct AdminLinkParams {
    pub token: Option<String>,
}

fn link_path(token: &str) -> String {
    let encoded: String = byte_serialize(token.as_bytes()).collect();
    format!("{ADMIN_LINK_PATH}?token={encoded}")
}

fn link_page(status: StatusCode, message: &'static str, href: String, label: &'static str) -> Response {
    ErrorPage {
        status,
        title: "Link Discord",
        message,
        action_href: href,
        action_label: label,
    }
    .into_response()
}

/// `POST /admin/link-token`: mint a link token for the calling admin.
///
/// Only credential admins may mint; granted Discord players and bridged
/// sessions get 403.
pub async fn issue_link_token_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
) -> AppResult<Json<LinkTokenResponse>> {
    let Principal::Admin(admin) = principal else {
        return Err(AppError::Forbidden(
            "Only credential admins can issue link tokens".into(),
        ));
    };
    let token = state
        .admin_links
        .issue(&admin.admin_id, Some(&admin.role))?;

    let path = link_path(&token);
    let url = match state.config.auth_center_url.as_deref() {
        Some(base) => format!("{base}{path}"),
        None => path,
    };
    Ok(Json(LinkTokenResponse {
        token,
        url,
        expires_in: ADMIN_LINK_TTL_SECS,
    }))
}

/// `GET /admin-link?token`: redeem a link token with the current Discord
/// session, then continue to the admin area.
pub async fn admin_link_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<AdminLinkParams>,
) -> Response {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        return link_page(
            StatusCode::BAD_REQUEST,
            "Missing token. Start the link from the admin panel.",
            ADMIN_LOGIN.into(),
            "Go to admin login",
        );
    };

    let link = match state.admin_links.consume(&token) {
        Ok(link) => link,
        Err(e) => {
            warn!("admin-link token rejected: {e}");
            return link_page(
                StatusCode::UNAUTHORIZED,
                "Token invalid or expired. Generate a new link from the admin panel.",
                ADMIN_LOGIN.into(),
                "Go to admin login",
            );
        }
    };

    let Some(session) = current_principal(&state, &jar).filter(|p| p.player_id().is_some())
    else {
        let callback: String = byte_serialize(link_path(&token).as_bytes()).collect();
        return link_page(
            StatusCode::UNAUTHORIZED,
            "Sign in with your Discord account to finish linking.",
            format!("/login?callbackUrl={callback}"),
            "Sign in with Discord",
        );
    };

    let principal = match state.authority.link_admin(session, &link).await {
        Ok(principal) => principal,
        Err(e) => return ErrorPage::from_auth_error(&e).into_response(),
    };
    match establish(&state, jar, &principal) {
        Ok(jar) => (jar, found(ADMIN_HOME)).into_response(),
        Err(e) => ErrorPage::from_auth_error(&e).into_response(),
    }
}
