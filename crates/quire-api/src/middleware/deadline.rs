//! Per-request deadline.
//!
//! The handler future is dropped when the deadline passes, which cancels
//! any in-flight database call it was awaiting.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::state::AppState;

pub async fn deadline_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.config.request_timeout;
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(%method, %path, timeout_ms = limit.as_millis() as u64, "request deadline exceeded");
            AppError::Unavailable("Request timed out".to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;

    async fn app(timeout: Duration) -> Router {
        let pool = crate::db::init_pool("sqlite::memory:").await.unwrap();
        let config = AppConfig {
            request_timeout: timeout,
            ..AppConfig::default()
        };
        let state = AppState::new(pool, config);
        Router::new()
            .route("/fast", get(|| async { "done" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(from_fn_with_state(state.clone(), deadline_middleware))
            .with_state(state)
    }

    #[tokio::test]
    async fn slow_handler_gets_503() {
        let app = app(Duration::from_millis(20)).await;
        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn fast_handler_passes_through() {
        let app = app(Duration::from_secs(1)).await;
        let response = app
            .oneshot(Request::builder().uri("/fast").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
