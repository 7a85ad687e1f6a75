//! # Response Envelope
//!
//! Every JSON response, success or failure, has the same shape:
//!
//! ```text
//! { "success": bool, "data"?: T, "message"?: string, "errors"?: [string], "timestamp": RFC 3339 }
//! ```
//!
//! Handlers return [`ApiResponse`] wrapped in `Json`; failures go through
//! [`crate::error::AppError`], which renders the same envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Uniform response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// Successful response with a message and no data.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            errors: None,
            timestamp: Utc::now(),
        }
    }

    /// Failure envelope.
    pub fn failure(message: impl Into<String>, errors: Option<Vec<String>>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            errors,
            timestamp: Utc::now(),
        }
    }
}

/// Handler result: a success envelope or an [`AppError`](crate::error::AppError).
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, crate::error::AppError>;

/// `201 Created` with the success envelope.
#[derive(Debug)]
pub struct Created<T>(pub ApiResponse<T>);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

/// Error envelope as documented in the OpenAPI schema.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Display-safe description.
    pub message: String,
    /// Per-field validation messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_omits_empty_fields() {
        let json = serde_json::to_value(ApiResponse::ok(42)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("message").is_none());
        assert!(json.get("errors").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn failure_envelope_carries_errors() {
        let body = ApiResponse::failure("bad", Some(vec!["login is required".into()]));
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "bad");
        assert_eq!(json["errors"][0], "login is required");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn message_envelope_has_no_data() {
        let json = serde_json::to_value(ApiResponse::message("done")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "done");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn error_body_matches_failure_envelope() {
        let json = serde_json::to_string(&ApiResponse::failure("nope", None)).unwrap();
        let parsed: ErrorBody = serde_json::from_str(&json).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.message, "nope");
        assert!(parsed.errors.is_none());
    }
}
