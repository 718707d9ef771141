//! Admin-grant management.

use axum::extract::State;
use axum::{Extension, Json};
use maven_core::auth::admin_link::DEFAULT_ACCESS_LEVEL;
use maven_core::models::auth::GrantRequest;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedPrincipal;
use crate::models::{GrantAdminRequest, GrantResponse, RevokeAdminRequest};

fn require_discord_id(raw: &str) -> AppResult<&str> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(AppError::Validation("discordId is required".into()));
    }
    Ok(id)
}

/// `POST /admin/grants`: grant or reactivate admin access for a Discord id.
pub async fn grant_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(admin)): Extension<AuthenticatedPrincipal>,
    Json(body): Json<GrantAdminRequest>,
) -> AppResult<Json<GrantResponse>> {
    let discord_id = require_discord_id(&body.discord_id)?.to_string();
    let access_level = body
        .access_level
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ACCESS_LEVEL.to_string());

    state
        .store
        .upsert_admin_grant(&GrantRequest {
            discord_id: discord_id.clone(),
            discord_username: body.discord_username,
            access_level,
            granted_by: admin.admin_id().map(str::to_string),
        })
        .await?;
    info!(discord_id = %discord_id, granted_by = ?admin.admin_id(), "admin access granted");

    Ok(Json(GrantResponse {
        discord_id,
        active: true,
    }))
}

/// `POST /admin/grants/revoke`: deactivate a grant.
///
/// Sessions already carrying the admin id keep it until their next refresh.
pub async fn revoke_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(admin)): Extension<AuthenticatedPrincipal>,
    Json(body): Json<RevokeAdminRequest>,
) -> AppResult<Json<GrantResponse>> {
    let discord_id = require_discord_id(&body.discord_id)?.to_string();
    let revoked = state
        .store
        .revoke_admin_grant(&discord_id, admin.admin_id())
        .await?;
    if !revoked {
        return Err(AppError::NotFound(format!(
            "no active grant for {discord_id}"
        )));
    }
    info!(discord_id = %discord_id, revoked_by = ?admin.admin_id(), "admin access revoked");

    Ok(Json(GrantResponse {
        discord_id,
        active: false,
    }))
}
