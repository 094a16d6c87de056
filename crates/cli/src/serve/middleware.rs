//! HTTP middleware: rate limiting and request tracing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{info, info_span, warn, Instrument};

use super::json_error;
use super::state::AppState;

/// Checks the per-IP request rate before routing.
pub(crate) async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();
    match state.rate_limiter.check(ip).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(%ip, retry_after, "rate limit exceeded");
            json_error(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                &format!("rate limit exceeded, retry after {retry_after}s"),
            )
            .into_response()
        }
    }
}

/// One span per request, closed with the status and latency.
pub(crate) async fn trace_middleware(request: Request<axum::body::Body>, next: Next) -> Response {
    let span = info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
    );
    async move {
        let started = Instant::now();
        let response = next.run(request).await;
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
        response
    }
    .instrument(span)
    .await
}
