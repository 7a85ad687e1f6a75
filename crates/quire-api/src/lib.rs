//! # quire-api: HTTP Service for the Quire CMS
//!
//! Axum application serving the Quire content API: accounts and sessions,
//! role-based administration, publishable records, themes, site settings and
//! registration invites. Storage is SQLite through SQLx.
//!
//! ## Request Pipeline
//!
//! ```text
//! TraceLayer → CatchPanic → Metrics → ErrorLog → [ /api: RateLimit → Auth → Deadline → Handler ]
//! ```
//!
//! The limiter runs first, so a banned client is turned away before its
//! token is decoded or the database is touched. It classifies reads by the
//! presence of an `Authorization` header alone. The deadline wraps only the
//! handler; a request that exceeds it gets 503.
//!
//! Health probes (`/health/*`) and `/metrics` sit outside `/api` and skip
//! authentication, rate limiting and the deadline.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod password;
pub mod response;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::catch_panic::CatchPanicLayer;

use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let metrics_on = state.config.metrics_enabled;

    // The last layer added sees the request first.
    let api = routes::router()
        .layer(from_fn_with_state(
            state.clone(),
            middleware::deadline::deadline_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), auth::auth_middleware))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ));

    let mut router = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .nest("/api", api);

    if metrics_on {
        router = router.route("/metrics", get(prometheus_metrics));
    }

    let mut router = router
        .fallback(error::route_not_found)
        .layer(from_fn(middleware::error_log::error_log_middleware));

    if metrics_on {
        router = router
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(state.metrics.clone()));
    }

    router
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(middleware::tracing_layer::layer())
        .with_state(state)
}

/// GET /metrics: Prometheus text exposition.
async fn prometheus_metrics(Extension(metrics): Extension<ApiMetrics>) -> Response {
    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 when the database answers, 503 otherwise.
async fn readiness(State(state): State<AppState>) -> Response {
    if let Err(e) = sqlx::query("SELECT 1").execute(&state.pool).await {
        tracing::warn!(error = %e, "database health check failed");
        return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
    }
    (StatusCode::OK, "ready").into_response()
}
