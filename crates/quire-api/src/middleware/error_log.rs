//! Logs every 4xx/5xx response with its method, path and status.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

pub async fn error_log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status();
    if status.is_server_error() {
        tracing::error!(%method, %path, status = status.as_u16(), "request failed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %path, status = status.as_u16(), "request rejected");
    }
    response
}
