//! # Error Kinds
//!
//! The closed taxonomy every failure in Quire is classified into. The HTTP
//! layer maps each kind to exactly one status code via [`ErrorKind::http_status`];
//! classification happens where the error is constructed, never by inspecting
//! message text afterwards.

use serde::{Deserialize, Serialize};

/// Classification of an application failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or missing input that fails schema rules.
    Validation,
    /// Request body could not be decoded at all.
    BadRequest,
    /// Missing, invalid or expired credentials.
    Authentication,
    /// Authenticated but lacking the required role.
    Authorization,
    /// The addressed resource does not exist.
    NotFound,
    /// The write collides with existing state (duplicate key, active theme, ...).
    Conflict,
    /// Client exceeded its request quota.
    RateLimited,
    /// The request did not finish within its deadline.
    Unavailable,
    /// The underlying store failed.
    Database,
    /// Anything not otherwise classified.
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 422,
            Self::BadRequest => 400,
            Self::Authentication => 401,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RateLimited => 429,
            Self::Unavailable => 503,
            Self::Database | Self::Internal => 500,
        }
    }

    /// Machine-readable code, as rendered in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::BadRequest => "BAD_REQUEST",
            Self::Authentication => "AUTHENTICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Database => "DATABASE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether the message of an error of this kind may be shown to clients.
    ///
    /// Server-side kinds carry store or panic detail and are replaced by a
    /// generic message before rendering.
    pub fn is_client_safe(self) -> bool {
        !matches!(self, Self::Database | Self::Internal)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
