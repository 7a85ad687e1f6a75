//! # Invite Routes
//!
//! Admin-only management of registration invites. An invite carries a role
//! (default `author`) that is granted when the code is redeemed at
//! registration.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Duration;
use quire_core::Schema;
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::auth::{require_role, Principal, Role};
use crate::db;
use crate::db::invites::InviteRow;
use crate::error::AppError;
use crate::extractors::{extract_path, extract_validated_json, Validate};
use crate::response::{ApiResponse, ApiResult, Created};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invites", get(list_invites).post(create_invite))
        .route("/invites/:code", delete(delete_invite))
}

const DEFAULT_ROLE: Role = Role::Author;
const DEFAULT_EXPIRY_HOURS: i64 = 72;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateInvite {
    /// Role granted on redemption. Defaults to `author`.
    #[serde(default)]
    pub role: Option<Role>,
    /// Hours until the code expires, 1 to 720. Defaults to 72.
    #[serde(default)]
    pub expires_in_hours: Option<i64>,
}

impl Validate for CreateInvite {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::invite_create()
    }
}

#[utoipa::path(
    get,
    path = "/api/invites",
    responses(
        (status = 200, description = "All invites, newest first", body = Vec<InviteRow>),
        (status = 403, description = "Admin role required", body = crate::response::ErrorBody),
    ),
    tag = "invites"
)]
pub(crate) async fn list_invites(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<InviteRow>> {
    require_role(&principal, Role::Admin)?;
    Ok(Json(ApiResponse::ok(db::invites::list(&state.pool).await?)))
}

#[utoipa::path(
    post,
    path = "/api/invites",
    request_body = CreateInvite,
    responses(
        (status = 201, description = "Invite created", body = InviteRow),
        (status = 403, description = "Admin role required", body = crate::response::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::response::ErrorBody),
    ),
    tag = "invites"
)]
pub(crate) async fn create_invite(
    State(state): State<AppState>,
    principal: Principal,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Created<InviteRow>, AppError> {
    require_role(&principal, Role::Admin)?;
    let req: CreateInvite = extract_validated_json(body)?;

    let role = req.role.unwrap_or(DEFAULT_ROLE);
    let hours = req.expires_in_hours.unwrap_or(DEFAULT_EXPIRY_HOURS);
    let now = state.now();
    let invite = db::invites::insert(
        &state.pool,
        role.as_str(),
        principal.id,
        now,
        now + Duration::hours(hours),
    )
    .await?;
    tracing::info!(actor = %principal.id, role = %role, expires_at = %invite.expires_at, "invite created");

    Ok(Created(ApiResponse::ok(invite).with_message("Invite created")))
}

#[utoipa::path(
    delete,
    path = "/api/invites/{code}",
    params(("code" = String, Path, description = "Invite code")),
    responses(
        (status = 204, description = "Invite deleted"),
        (status = 404, description = "Invite not found", body = crate::response::ErrorBody),
    ),
    tag = "invites"
)]
pub(crate) async fn delete_invite(
    State(state): State<AppState>,
    principal: Principal,
    code: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, AppError> {
    require_role(&principal, Role::Admin)?;
    let code = extract_path(code, "Invite")?;
    if !db::invites::delete(&state.pool, &code).await? {
        return Err(AppError::NotFound("Invite not found".to_string()));
    }
    tracing::info!(actor = %principal.id, "invite deleted");
    Ok(StatusCode::NO_CONTENT)
}
