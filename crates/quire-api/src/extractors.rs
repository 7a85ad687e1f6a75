//! # JSON Extraction & Validation
//!
//! Request bodies are checked twice: first as raw JSON against the
//! endpoint's [`Schema`] (so every field problem is reported at once), then
//! decoded into the typed request DTO.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::Json;
use quire_core::{validate, Schema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;

/// Request DTOs that carry a validation schema.
pub trait Validate {
    fn schema() -> &'static Schema;
}

/// Extract a JSON body, mapping framing errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a path parameter, mapping a malformed value to a 404.
///
/// An identifier that does not parse cannot name an existing resource.
pub fn extract_path<T>(result: Result<Path<T>, PathRejection>, what: &str) -> Result<T, AppError> {
    result
        .map(|Path(v)| v)
        .map_err(|_| AppError::NotFound(format!("{what} not found")))
}

/// Extract a JSON body, validate it against `T::schema()`, then decode it.
///
/// Handlers take `body: Result<Json<Value>, JsonRejection>` and call this.
pub fn extract_validated_json<T>(result: Result<Json<Value>, JsonRejection>) -> Result<T, AppError>
where
    T: Validate + DeserializeOwned,
{
    let raw = extract_json(result)?;
    if !raw.is_object() {
        return Err(AppError::BadRequest(
            "request body must be a JSON object".to_string(),
        ));
    }
    validate(&raw, T::schema()).into_result().map_err(|errors| AppError::Validation { errors })?;
    serde_json::from_value(raw).map_err(|e| AppError::validation(e.to_string()))
}
