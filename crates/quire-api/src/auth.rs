//! # Authentication & Authorization
//!
//! Bearer-token authentication with role-based access control.
//!
//! ## Resolution
//!
//! [`auth_middleware`] runs on every API request and never rejects on its
//! own. It resolves a [`Caller`] and stores it in the request extensions:
//!
//! ```text
//! no header            → Caller::Anonymous
//! header, bad token    → Caller::Rejected(reason)     (anonymous for optional endpoints)
//! header, good token   → Caller::Authenticated(Principal)
//! ```
//!
//! A token is good when its signature and expiry check out, its subject
//! still exists and is active, and (in strict-session mode) its session row
//! is still live. Roles are loaded from membership rows on every request.
//!
//! ## Gates
//!
//! - [`Principal`] as an extractor requires authentication (401 otherwise).
//! - [`OptionalPrincipal`] never fails.
//! - [`require_role`] / [`require_any_role`] turn a missing role into 403.

use std::str::FromStr;

use axum::extract::{Request, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use quire_core::token::bearer_token;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::state::AppState;

// ── Role ────────────────────────────────────────────────────────────────────

/// CMS roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Everything, including users, themes, settings and invites.
    Admin,
    /// Edit and publish any record.
    Editor,
    /// Write and edit own records.
    Author,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Author => "author",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            "author" => Ok(Self::Author),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Principal ───────────────────────────────────────────────────────────────

/// The authenticated user behind a request. Request-scoped, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub login: String,
    pub session_id: Uuid,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has_role(*r))
    }
}

/// Outcome of authentication for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// No credentials supplied.
    Anonymous,
    /// Credentials supplied but not accepted.
    Rejected(String),
    Authenticated(Principal),
}

impl Caller {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authenticated(p) => Some(p),
            _ => None,
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Caller>() {
            Some(Caller::Authenticated(principal)) => Ok(principal.clone()),
            Some(Caller::Rejected(reason)) => Err(AppError::Unauthorized(reason.clone())),
            Some(Caller::Anonymous) | None => {
                Err(AppError::Unauthorized("Authentication required".to_string()))
            }
        }
    }
}

/// Principal when the caller is authenticated, `None` otherwise.
#[derive(Debug, Clone)]
pub struct OptionalPrincipal(pub Option<Principal>);

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for OptionalPrincipal {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<Caller>()
                .and_then(Caller::principal)
                .cloned(),
        ))
    }
}

/// 403 unless the principal holds `role`.
pub fn require_role(principal: &Principal, role: Role) -> Result<(), AppError> {
    if principal.has_role(role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("'{role}' role required")))
    }
}

/// 403 unless the principal holds at least one of `roles`.
pub fn require_any_role(principal: &Principal, roles: &[Role]) -> Result<(), AppError> {
    if principal.has_any_role(roles) {
        Ok(())
    } else {
        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(AppError::Forbidden(format!(
            "one of the roles [{}] is required",
            names.join(", ")
        )))
    }
}

// ── Token Resolution ────────────────────────────────────────────────────────

/// Verify `token` and load the principal it names.
///
/// The error is a display-safe reason; details go to the log.
pub async fn resolve_principal(state: &AppState, token: &str) -> Result<Principal, String> {
    const INVALID: &str = "Invalid or expired token";

    let claims = state.tokens.decode(token).map_err(|e| {
        tracing::debug!(error = %e, "token rejected");
        INVALID.to_string()
    })?;

    let db_error = |e: sqlx::Error| {
        tracing::error!(error = %e, "database error during authentication");
        INVALID.to_string()
    };

    let user = db::users::find_by_id(&state.pool, claims.sub)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            tracing::info!(user_id = %claims.sub, "token subject no longer exists");
            INVALID.to_string()
        })?;
    if !user.is_active {
        return Err("Account is deactivated".to_string());
    }

    if state.config.strict_sessions {
        let session = db::sessions::find(&state.pool, claims.sid)
            .await
            .map_err(db_error)?;
        match session {
            Some(s) if s.user_id == claims.sub && s.expires_at > state.now() => {}
            _ => return Err("Session has ended".to_string()),
        }
    }

    let roles = db::roles::for_user(&state.pool, user.id)
        .await
        .map_err(db_error)?
        .into_iter()
        .filter_map(|name| match name.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "ignoring unknown role");
                None
            }
        })
        .collect();

    Ok(Principal {
        id: user.id,
        login: user.login,
        session_id: claims.sid,
        roles,
    })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Resolve the caller and store it in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default().to_string());

    let caller = match header_value {
        None => Caller::Anonymous,
        Some(value) => match bearer_token(&value) {
            None => {
                tracing::debug!("authorization header without a bearer token");
                Caller::Rejected("Authorization header must use the Bearer scheme".to_string())
            }
            Some(token) => match resolve_principal(&state, token).await {
                Ok(principal) => Caller::Authenticated(principal),
                Err(reason) => Caller::Rejected(reason),
            },
        },
    };

    request.extensions_mut().insert(caller);
    next.run(request).await
}
