//! # Rate Limiting Middleware
//!
//! Adapts [`quire_core::RateLimiter`] to the request pipeline. The client is
//! identified from proxy headers, falling back to the peer address when the
//! server was started with connect info. Allowed requests get
//! `X-RateLimit-*` headers; limited ones short-circuit with 429.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use quire_core::{client_identifier, RateLimitDecision, RequestInfo};

use crate::error::AppError;
use crate::state::AppState;

/// Middleware that enforces the sliding-window quotas.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client_id = client_identifier(
        |name| request.headers().get(name).and_then(|v| v.to_str().ok()),
        peer,
    );

    let decision = state.limiter.check(&RequestInfo {
        method: request.method().as_str(),
        path: request.uri().path(),
        has_authorization: request.headers().contains_key(header::AUTHORIZATION),
        client_id: &client_id,
        peer,
    });

    if let RateLimitDecision::Limited {
        bucket,
        retry_after_secs,
        ..
    } = &decision
    {
        state.metrics.record_rate_limited(bucket.as_str());
        return AppError::RateLimited {
            message: decision.message().unwrap_or_default(),
            retry_after_secs: *retry_after_secs,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    for (name, value) in decision.headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(name), value);
        }
    }
    response
}
