//! # API Error Types
//!
//! [`AppError`] is the single error type handlers return. Each variant maps
//! to one [`ErrorKind`], and the kind alone decides the HTTP status. The
//! response body is the standard failure envelope; messages of server-side
//! kinds (`DATABASE`, `INTERNAL`) are logged and replaced by a generic text.

use std::any::Any;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use quire_core::ErrorKind;
use thiserror::Error;

use crate::response::ApiResponse;

const GENERIC_SERVER_MESSAGE: &str = "An internal error occurred";

/// Application-level error, rendered through the response envelope.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request failed schema validation (422).
    #[error("validation failed: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    /// Request body could not be decoded (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Collides with existing state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Client exceeded its request quota (429).
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    /// Deadline exceeded (503).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Store failure (500). Message is logged, never returned.
    #[error("database error: {0}")]
    Database(String),

    /// Anything else (500). Message is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Single-message validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![message.into()],
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Unauthorized(_) => ErrorKind::Authentication,
            Self::Forbidden(_) => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Database(_) => ErrorKind::Database,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Display-safe message for the envelope.
    fn client_message(&self) -> String {
        match self {
            Self::Validation { .. } => "Validation failed".to_string(),
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Unavailable(m) => m.clone(),
            Self::RateLimited { message, .. } => message.clone(),
            Self::Database(_) | Self::Internal(_) => GENERIC_SERVER_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = self.status();

        if !kind.is_client_safe() {
            tracing::error!(kind = %kind, error = %self, "server error");
        }

        let errors = match &self {
            Self::Validation { errors } => Some(errors.clone()),
            _ => None,
        };
        let body = ApiResponse::failure(self.client_message(), errors);
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited {
            retry_after_secs, ..
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("resource not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict("a resource with the same unique value already exists".to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Self::Conflict("the referenced resource does not exist".to_string())
            }
            sqlx::Error::PoolTimedOut => Self::Unavailable("database is busy".to_string()),
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<quire_core::ValidationReport> for AppError {
    fn from(report: quire_core::ValidationReport) -> Self {
        Self::Validation {
            errors: report.errors,
        }
    }
}

/// Render a caught handler panic as an `INTERNAL` envelope.
///
/// Used with `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// Fallback for unknown routes.
pub async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}
