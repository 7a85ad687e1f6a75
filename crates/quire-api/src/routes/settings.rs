//! # Settings Routes
//!
//! `GET /api/settings` returns every setting as a JSON map. `PUT` upserts
//! a subset of the known keys; unknown keys are rejected as a whole.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use quire_core::validation::schemas::SETTING_KEYS;
use quire_core::validate;
use serde_json::{Map, Value};

use crate::auth::{require_role, Principal, Role};
use crate::db;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).put(update_settings))
}

#[utoipa::path(
    get,
    path = "/api/settings",
    responses((status = 200, description = "All settings keyed by name", body = Value)),
    tag = "settings"
)]
pub(crate) async fn get_settings(State(state): State<AppState>) -> ApiResult<Map<String, Value>> {
    Ok(Json(ApiResponse::ok(db::settings::all(&state.pool).await?)))
}

/// Check keys and values of a settings update.
fn check_update(body: &Map<String, Value>) -> Result<Vec<(String, Value)>, AppError> {
    if body.is_empty() {
        return Err(AppError::validation("at least one setting is required"));
    }

    let mut errors: Vec<String> = body
        .keys()
        .filter(|k| !SETTING_KEYS.contains(&k.as_str()))
        .map(|k| format!("{k} is not a known setting"))
        .collect();
    errors.extend(
        body.iter()
            .filter(|(k, v)| v.is_null() && SETTING_KEYS.contains(&k.as_str()))
            .map(|(k, _)| format!("{k} must not be null")),
    );
    let report = validate(
        &Value::Object(body.clone()),
        quire_core::validation::schemas::settings_update(),
    );
    errors.extend(report.errors);
    if !errors.is_empty() {
        return Err(AppError::Validation { errors });
    }

    Ok(body
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => Value::String(s.trim().to_string()),
                other => other.clone(),
            };
            (k.clone(), value)
        })
        .collect())
}

#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = Value,
    responses(
        (status = 200, description = "Settings after the update", body = Value),
        (status = 403, description = "Admin role required", body = crate::response::ErrorBody),
        (status = 422, description = "Unknown key or invalid value", body = crate::response::ErrorBody),
    ),
    tag = "settings"
)]
pub(crate) async fn update_settings(
    State(state): State<AppState>,
    principal: Principal,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Map<String, Value>> {
    require_role(&principal, Role::Admin)?;
    let Value::Object(body) = extract_json(body)? else {
        return Err(AppError::BadRequest(
            "request body must be a JSON object".to_string(),
        ));
    };
    let pairs = check_update(&body)?;

    db::settings::upsert(&state.pool, &pairs).await?;
    let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
    tracing::info!(actor = %principal.id, keys = ?keys, "settings updated");

    let settings = db::settings::all(&state.pool).await?;
    Ok(Json(ApiResponse::ok(settings).with_message("Settings updated")))
}
