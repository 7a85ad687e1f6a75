//! # API Route Modules
//!
//! Each submodule owns one resource and exposes a `router()` that is
//! merged into the `/api` router in [`crate::app`].

pub mod auth;
pub mod invites;
pub mod records;
pub mod settings;
pub mod themes;
pub mod users;

use axum::Router;

use crate::state::AppState;

/// Every `/api` resource router, merged. Paths are relative to `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(records::router())
        .merge(themes::router())
        .merge(settings::router())
        .merge(invites::router())
        .merge(crate::openapi::router())
}
