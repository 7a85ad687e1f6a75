//! # User Administration Routes
//!
//! - `GET    /api/users`           : list users
//! - `GET    /api/users/:id`       : one user
//! - `PUT    /api/users/:id/roles` : replace the role set
//! - `PUT    /api/users/:id/status` : activate or deactivate
//! - `DELETE /api/users/:id`       : delete with cascade
//!
//! All require the `admin` role. An admin cannot delete or deactivate
//! themselves, nor drop their own `admin` role.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use quire_core::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, Principal, Role};
use crate::db;
use crate::db::users::UserRow;
use crate::error::AppError;
use crate::extractors::{extract_path, extract_validated_json, Validate};
use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route("/users/:id/roles", put(assign_roles))
        .route("/users/:id/status", put(set_status))
}

// ── Views ───────────────────────────────────────────────────────────────────

/// Free-form profile fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileView {
    pub bio: Option<String>,
    pub website: Option<String>,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub login: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub profile: ProfileView,
    pub is_active: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserView {
    pub fn new(row: UserRow, roles: Vec<String>) -> Self {
        Self {
            id: row.id,
            login: row.login,
            email: row.email,
            display_name: row.display_name,
            profile: ProfileView {
                bio: row.bio,
                website: row.website,
            },
            is_active: row.is_active,
            roles,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        }
    }

    /// Load a user and its roles. `None` when the user does not exist.
    pub async fn load(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, AppError> {
        let Some(row) = db::users::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let roles = db::roles::for_user(pool, id).await?;
        Ok(Some(Self::new(row, roles)))
    }
}

// ── Requests ────────────────────────────────────────────────────────────────

/// Replacement role set.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleAssignment {
    pub roles: Vec<Role>,
}

impl Validate for RoleAssignment {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::role_assignment()
    }
}

/// Activation flag.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusUpdate {
    pub is_active: bool,
}

impl Validate for StatusUpdate {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::user_status()
    }
}

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

// ── Handlers ────────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users", body = Vec<UserView>),
        (status = 401, description = "Not authenticated", body = crate::response::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::response::ErrorBody),
    ),
    tag = "users"
)]
pub(crate) async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<UserView>> {
    require_role(&principal, Role::Admin)?;
    let rows = db::users::list(&state.pool).await?;
    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        let roles = db::roles::for_user(&state.pool, row.id).await?;
        users.push(UserView::new(row, roles));
    }
    Ok(Json(ApiResponse::ok(users)))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "The user", body = UserView),
        (status = 404, description = "User not found", body = crate::response::ErrorBody),
    ),
    tag = "users"
)]
pub(crate) async fn get_user(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<UserView> {
    require_role(&principal, Role::Admin)?;
    let id = extract_path(id, "User")?;
    let user = UserView::load(&state.pool, id).await?.ok_or_else(user_not_found)?;
    Ok(Json(ApiResponse::ok(user)))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/roles",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = RoleAssignment,
    responses(
        (status = 200, description = "Roles replaced", body = UserView),
        (status = 404, description = "User not found", body = crate::response::ErrorBody),
        (status = 409, description = "Would remove the caller's own admin role", body = crate::response::ErrorBody),
        (status = 422, description = "Unknown role", body = crate::response::ErrorBody),
    ),
    tag = "users"
)]
pub(crate) async fn assign_roles(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<UserView> {
    require_role(&principal, Role::Admin)?;
    let id = extract_path(id, "User")?;
    let req: RoleAssignment = extract_validated_json(body)?;

    let mut roles: Vec<String> = req.roles.iter().map(|r| r.as_str().to_string()).collect();
    roles.sort();
    roles.dedup();

    if id == principal.id && !req.roles.contains(&Role::Admin) {
        return Err(AppError::Conflict(
            "You cannot remove your own admin role".to_string(),
        ));
    }
    if db::users::find_by_id(&state.pool, id).await?.is_none() {
        return Err(user_not_found());
    }

    let granted = match db::roles::replace(&state.pool, id, &roles).await? {
        db::roles::Replaced::Granted(granted) => granted,
        db::roles::Replaced::UnknownRole(role) => {
            return Err(AppError::validation(format!("roles contains unknown role: {role}")));
        }
    };
    tracing::info!(actor = %principal.id, user_id = %id, roles = ?granted, "roles replaced");

    let user = UserView::load(&state.pool, id).await?.ok_or_else(user_not_found)?;
    Ok(Json(ApiResponse::ok(user).with_message("Roles updated")))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/status",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = UserView),
        (status = 404, description = "User not found", body = crate::response::ErrorBody),
        (status = 409, description = "Cannot deactivate self", body = crate::response::ErrorBody),
    ),
    tag = "users"
)]
pub(crate) async fn set_status(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<UserView> {
    require_role(&principal, Role::Admin)?;
    let id = extract_path(id, "User")?;
    let req: StatusUpdate = extract_validated_json(body)?;

    if id == principal.id && !req.is_active {
        return Err(AppError::Conflict(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    if !db::users::set_active(&state.pool, id, req.is_active, state.now()).await? {
        return Err(user_not_found());
    }
    tracing::info!(actor = %principal.id, user_id = %id, is_active = req.is_active, "user status changed");

    let user = UserView::load(&state.pool, id).await?.ok_or_else(user_not_found)?;
    let message = if req.is_active {
        "User activated"
    } else {
        "User deactivated"
    };
    Ok(Json(ApiResponse::ok(user).with_message(message)))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found", body = crate::response::ErrorBody),
        (status = 409, description = "Cannot delete self", body = crate::response::ErrorBody),
    ),
    tag = "users"
)]
pub(crate) async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    require_role(&principal, Role::Admin)?;
    let id = extract_path(id, "User")?;
    if id == principal.id {
        return Err(AppError::Conflict(
            "You cannot delete your own account".to_string(),
        ));
    }
    if !db::users::delete_cascade(&state.pool, id).await? {
        return Err(user_not_found());
    }
    tracing::info!(actor = %principal.id, user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_assignment_rejects_unknown_roles_before_decoding() {
        let body = serde_json::json!({"roles": ["admin", "root"]});
        let err = extract_validated_json::<RoleAssignment>(Ok(Json(body))).unwrap_err();
        match err {
            AppError::Validation { errors } => {
                assert!(errors.iter().any(|e| e.contains("root")), "{errors:?}")
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn status_update_requires_boolean() {
        let err = extract_validated_json::<StatusUpdate>(Ok(Json(serde_json::json!({"is_active": "yes"}))))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn user_view_nests_profile_and_hides_hash() {
        let now = Utc::now();
        let row = UserRow {
            id: Uuid::new_v4(),
            login: "ed".into(),
            email: None,
            password_hash: "$argon2id$secret".into(),
            display_name: Some("Ed".into()),
            bio: Some("hi".into()),
            website: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        let json = serde_json::to_value(UserView::new(row, vec!["editor".into()])).unwrap();
        assert_eq!(json["profile"]["bio"], "hi");
        assert_eq!(json["roles"][0], "editor");
        assert!(!json.to_string().contains("argon2"));
    }
}
