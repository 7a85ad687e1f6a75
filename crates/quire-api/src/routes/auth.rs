//! # Account Routes
//!
//! - `POST /api/register`   : create an account
//! - `POST /api/login`      : exchange credentials for a bearer token
//! - `POST /api/logout`     : end the caller's session
//! - `GET  /api/me`         : the caller's profile
//! - `PUT  /api/me`         : update the caller's profile
//! - `PUT  /api/me/password`: change password (ends the session)
//!
//! Login swaps the user's session row, so at most one session is live per
//! user. With strict sessions on, tokens from earlier logins stop working.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, TimeZone, Utc};
use quire_core::Schema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::auth::Principal;
use crate::config::MAX_TOKEN_TTL_SECS;
use crate::db;
use crate::db::users::{NewUser, ProfileChanges, Registration};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::password;
use crate::response::{ApiResponse, ApiResult, Created};
use crate::routes::users::UserView;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me).put(update_me))
        .route("/me/password", put(change_password))
}

const BAD_CREDENTIALS: &str = "Invalid login or password";
const MAX_CLIENT_LEN: usize = 255;

// ── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Required when registration is closed.
    #[serde(default)]
    pub invite_code: Option<String>,
}

impl Validate for RegisterRequest {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::register()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::login()
    }
}

/// Present-but-null deserializes as `Some(None)`, absent as `None`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProfileFields {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub website: Option<Option<String>>,
}

/// Profile update. Omitted fields are kept; `null` or `""` clears a field.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    #[serde(default)]
    pub profile: Option<ProfileFields>,
}

impl Validate for ProfileUpdate {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::profile_update()
    }
}

fn blank_to_none(field: Option<Option<String>>) -> Option<Option<String>> {
    field.map(|v| {
        v.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

impl ProfileUpdate {
    fn into_changes(self) -> ProfileChanges {
        let profile = self.profile.unwrap_or_default();
        ProfileChanges {
            display_name: blank_to_none(self.display_name),
            email: blank_to_none(self.email),
            bio: blank_to_none(profile.bio),
            website: blank_to_none(profile.website),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl Validate for PasswordChange {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::password_change()
    }
}

// ── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    /// Always `Bearer`.
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

// ── Handlers ────────────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserView),
        (status = 403, description = "Registration closed or invite invalid", body = crate::response::ErrorBody),
        (status = 409, description = "Login or email already taken", body = crate::response::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::response::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Created<UserView>, AppError> {
    let req: RegisterRequest = extract_validated_json(body)?;
    let login = req.login.trim();
    let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let invite = req
        .invite_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    if db::users::find_by_login(&state.pool, login).await?.is_some() {
        return Err(AppError::Conflict("Login is already taken".to_string()));
    }

    let password_hash = password::hash(state.config.password, req.password).await?;
    let new_user = NewUser {
        login,
        email,
        password_hash: &password_hash,
    };

    let id = match db::users::register(&state.pool, &new_user, invite, state.now()).await? {
        Registration::Created { id, roles } => {
            tracing::info!(user_id = %id, login = %login, roles = ?roles, "user registered");
            id
        }
        Registration::Closed => {
            return Err(AppError::Forbidden(
                "Registration is closed; an invite code is required".to_string(),
            ))
        }
        Registration::InvalidInvite => {
            return Err(AppError::Forbidden(
                "Invite code is invalid, expired or already used".to_string(),
            ))
        }
    };

    let user = UserView::load(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::Internal("registered user vanished".to_string()))?;
    Ok(Created(ApiResponse::ok(user).with_message("Registration successful")))
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Bad credentials", body = crate::response::ErrorBody),
        (status = 403, description = "Account deactivated", body = crate::response::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::response::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let req: LoginRequest = extract_validated_json(body)?;
    let now = state.now();

    let purged = db::sessions::purge_expired(&state.pool, now).await?;
    if purged > 0 {
        tracing::debug!(purged, "expired sessions removed");
    }

    let Some(user) = db::users::find_by_login(&state.pool, req.login.trim()).await? else {
        tracing::info!(login = %req.login, "login for unknown account");
        state
            .decoy_hash
            .verify(state.config.password, req.password)
            .await?;
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    };
    if !password::verify(req.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.id, "login with wrong password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }
    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }

    let client = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(MAX_CLIENT_LEN).collect::<String>());
    let ttl = Duration::seconds(state.tokens.ttl_secs().min(MAX_TOKEN_TTL_SECS) as i64);
    let session_id =
        db::sessions::replace_for_user(&state.pool, user.id, client.as_deref(), now, now + ttl)
            .await?;

    let (token, exp) = state.tokens.issue(user.id, session_id, &user.login);
    let expires_at = Utc
        .timestamp_opt(exp as i64, 0)
        .single()
        .unwrap_or(now + ttl);

    let view = UserView::load(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    tracing::info!(user_id = %user.id, session_id = %session_id, "login succeeded");

    Ok(Json(
        ApiResponse::ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_at,
            user: view,
        })
        .with_message("Login successful"),
    ))
}

#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "Not authenticated", body = crate::response::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn logout(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<StatusCode, AppError> {
    db::sessions::delete(&state.pool, principal.session_id).await?;
    tracing::info!(user_id = %principal.id, "logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Caller profile", body = UserView),
        (status = 401, description = "Not authenticated", body = crate::response::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn me(State(state): State<AppState>, principal: Principal) -> ApiResult<UserView> {
    let user = UserView::load(&state.pool, principal.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;
    Ok(Json(ApiResponse::ok(user)))
}

#[utoipa::path(
    put,
    path = "/api/me",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = UserView),
        (status = 409, description = "Email already in use", body = crate::response::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::response::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn update_me(
    State(state): State<AppState>,
    principal: Principal,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<UserView> {
    let req: ProfileUpdate = extract_validated_json(body)?;
    let changes = req.into_changes();
    if !db::users::update_profile(&state.pool, principal.id, &changes, state.now()).await? {
        return Err(AppError::Unauthorized("Account no longer exists".to_string()));
    }
    let user = UserView::load(&state.pool, principal.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;
    Ok(Json(ApiResponse::ok(user).with_message("Profile updated")))
}

#[utoipa::path(
    put,
    path = "/api/me/password",
    request_body = PasswordChange,
    responses(
        (status = 200, description = "Password changed; log in again"),
        (status = 422, description = "Current password wrong or new one invalid", body = crate::response::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<()> {
    let req: PasswordChange = extract_validated_json(body)?;
    let user = db::users::find_by_id(&state.pool, principal.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;

    if !password::verify(req.current_password, user.password_hash).await? {
        return Err(AppError::validation("current_password is incorrect"));
    }
    let new_hash = password::hash(state.config.password, req.new_password).await?;
    db::users::set_password(&state.pool, principal.id, &new_hash, state.now()).await?;
    tracing::info!(user_id = %principal.id, "password changed");

    Ok(Json(ApiResponse::message(
        "Password changed; please log in again",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_update_distinguishes_absent_null_and_blank() {
        let req: ProfileUpdate = serde_json::from_value(json!({
            "display_name": null,
            "profile": {"bio": "  ", "website": "https://example.org"}
        }))
        .unwrap();
        let changes = req.into_changes();
        assert_eq!(changes.display_name, Some(None));
        assert_eq!(changes.email, None);
        assert_eq!(changes.bio, Some(None));
        assert_eq!(changes.website, Some(Some("https://example.org".into())));
    }

    #[test]
    fn nested_profile_fields_are_validated() {
        let err = extract_validated_json::<ProfileUpdate>(Ok(Json(json!({
            "profile": {"website": "ftp://nope"}
        }))))
        .unwrap_err();
        match err {
            AppError::Validation { errors } => {
                assert!(errors.iter().any(|e| e.contains("profile.website")), "{errors:?}")
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn register_reports_every_field_problem() {
        let err =
            extract_validated_json::<RegisterRequest>(Ok(Json(json!({"login": "ab", "password": "x"}))))
                .unwrap_err();
        match err {
            AppError::Validation { errors } => {
                assert!(errors.iter().any(|e| e.starts_with("login")));
                assert!(errors.iter().any(|e| e.starts_with("password")));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
