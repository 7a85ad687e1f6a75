//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into one OpenAPI document,
//! served at `/api/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Session token returned by POST /api/login."))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Quire CMS API",
        version = "0.1.0",
        description = "Accounts, roles, publishable records, themes, settings and invites.\n\nAuthentication: `Authorization: Bearer <token>` from `POST /api/login`. Every response uses the `{success, data?, message?, errors?, timestamp}` envelope."
    ),
    servers((url = "http://localhost:8080", description = "Local development server")),
    paths(
        // ── Accounts ────────────────────────────────────────────────────
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::me,
        crate::routes::auth::update_me,
        crate::routes::auth::change_password,
        // ── Users ───────────────────────────────────────────────────────
        crate::routes::users::list_users,
        crate::routes::users::get_user,
        crate::routes::users::assign_roles,
        crate::routes::users::set_status,
        crate::routes::users::delete_user,
        // ── Records ─────────────────────────────────────────────────────
        crate::routes::records::list_records,
        crate::routes::records::get_record,
        crate::routes::records::create_record,
        crate::routes::records::update_record,
        crate::routes::records::publish_record,
        crate::routes::records::unpublish_record,
        crate::routes::records::delete_record,
        // ── Themes ──────────────────────────────────────────────────────
        crate::routes::themes::list_themes,
        crate::routes::themes::create_theme,
        crate::routes::themes::activate_theme,
        crate::routes::themes::delete_theme,
        // ── Settings ────────────────────────────────────────────────────
        crate::routes::settings::get_settings,
        crate::routes::settings::update_settings,
        // ── Invites ─────────────────────────────────────────────────────
        crate::routes::invites::list_invites,
        crate::routes::invites::create_invite,
        crate::routes::invites::delete_invite,
    ),
    components(
        schemas(
            crate::response::ErrorBody,
            crate::auth::Role,
            crate::routes::auth::RegisterRequest,
            crate::routes::auth::LoginRequest,
            crate::routes::auth::LoginResponse,
            crate::routes::auth::ProfileUpdate,
            crate::routes::auth::ProfileFields,
            crate::routes::auth::PasswordChange,
            crate::routes::users::UserView,
            crate::routes::users::ProfileView,
            crate::routes::users::RoleAssignment,
            crate::routes::users::StatusUpdate,
            crate::routes::records::CreateRecord,
            crate::routes::records::UpdateRecord,
            crate::routes::records::RecordPage,
            crate::db::records::RecordRow,
            crate::routes::themes::CreateTheme,
            crate::db::themes::ThemeRow,
            crate::routes::invites::CreateInvite,
            crate::db::invites::InviteRow,
        ),
    ),
    modifiers(&SecurityAddon),
    security(("bearer_auth" = [])),
    tags(
        (name = "auth", description = "Registration, login, logout and the caller's own account"),
        (name = "users", description = "User administration (admin)"),
        (name = "records", description = "Publishable records"),
        (name = "themes", description = "Themes; exactly one is active"),
        (name = "settings", description = "Site-wide settings"),
        (name = "invites", description = "Registration invites (admin)"),
    )
)]
pub struct ApiDoc;

/// Serves the document at `/openapi.json` relative to the mount point.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
