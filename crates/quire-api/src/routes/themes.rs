//! # Theme Routes
//!
//! Listing is public; creating, activating and deleting need `admin`.
//! Exactly one theme is active at a time, and the active one cannot be
//! deleted.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use quire_core::Schema;
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, Principal, Role};
use crate::db;
use crate::db::themes::{DeleteOutcome, ThemeRow};
use crate::error::AppError;
use crate::extractors::{extract_path, extract_validated_json, Validate};
use crate::response::{ApiResponse, ApiResult, Created};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/themes", get(list_themes).post(create_theme))
        .route("/themes/:id/activate", put(activate_theme))
        .route("/themes/:id", delete(delete_theme))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTheme {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Validate for CreateTheme {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::theme_create()
    }
}

fn theme_not_found() -> AppError {
    AppError::NotFound("Theme not found".to_string())
}

#[utoipa::path(
    get,
    path = "/api/themes",
    responses((status = 200, description = "All themes", body = Vec<ThemeRow>)),
    tag = "themes"
)]
pub(crate) async fn list_themes(State(state): State<AppState>) -> ApiResult<Vec<ThemeRow>> {
    Ok(Json(ApiResponse::ok(db::themes::list(&state.pool).await?)))
}

#[utoipa::path(
    post,
    path = "/api/themes",
    request_body = CreateTheme,
    responses(
        (status = 201, description = "Theme created (inactive)", body = ThemeRow),
        (status = 409, description = "Name already in use", body = crate::response::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::response::ErrorBody),
    ),
    tag = "themes"
)]
pub(crate) async fn create_theme(
    State(state): State<AppState>,
    principal: Principal,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Created<ThemeRow>, AppError> {
    require_role(&principal, Role::Admin)?;
    let req: CreateTheme = extract_validated_json(body)?;
    let description = req.description.as_deref().map(str::trim).filter(|d| !d.is_empty());

    let theme = db::themes::insert(&state.pool, req.name.trim(), description, state.now())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("A theme with that name already exists".to_string())
            }
            _ => AppError::from(e),
        })?;
    tracing::info!(theme_id = %theme.id, name = %theme.name, "theme created");
    Ok(Created(ApiResponse::ok(theme).with_message("Theme created")))
}

#[utoipa::path(
    put,
    path = "/api/themes/{id}/activate",
    params(("id" = Uuid, Path, description = "Theme ID")),
    responses(
        (status = 200, description = "Theme is now the only active one", body = ThemeRow),
        (status = 404, description = "Theme not found", body = crate::response::ErrorBody),
    ),
    tag = "themes"
)]
pub(crate) async fn activate_theme(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ThemeRow> {
    require_role(&principal, Role::Admin)?;
    let id = extract_path(id, "Theme")?;
    let theme = db::themes::activate(&state.pool, id)
        .await?
        .ok_or_else(theme_not_found)?;
    tracing::info!(theme_id = %id, actor = %principal.id, "theme activated");
    Ok(Json(ApiResponse::ok(theme).with_message("Theme activated")))
}

#[utoipa::path(
    delete,
    path = "/api/themes/{id}",
    params(("id" = Uuid, Path, description = "Theme ID")),
    responses(
        (status = 204, description = "Theme deleted"),
        (status = 404, description = "Theme not found", body = crate::response::ErrorBody),
        (status = 409, description = "Theme is active", body = crate::response::ErrorBody),
    ),
    tag = "themes"
)]
pub(crate) async fn delete_theme(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    require_role(&principal, Role::Admin)?;
    let id = extract_path(id, "Theme")?;
    match db::themes::delete(&state.pool, id).await? {
        DeleteOutcome::Deleted => {
            tracing::info!(theme_id = %id, actor = %principal.id, "theme deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteOutcome::NotFound => Err(theme_not_found()),
        DeleteOutcome::Active => Err(AppError::Conflict(
            "The active theme cannot be deleted".to_string(),
        )),
    }
}
