//! HTTP middleware.

use super::AppState;
use crate::error::ApiError;
use crate::metrics;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

/// Count every request by method and final status.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let response = next.run(req).await;
    let status = response.status().as_u16();
    metrics::record_http_request(method.as_str(), status);
    debug!(%method, %path, status, "HTTP request");
    response
}

/// Refuse requests that arrive on kept-alive connections after shutdown began.
pub async fn reject_during_shutdown(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if state.shutdown.is_cancelled() {
        return ApiError::ShuttingDown.into_response();
    }
    next.run(req).await
}

/// Per-IP request budget. Requests without a peer address are not limited.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(ip) = peer_ip(&req)
        && !state.rate_limiter.check_http_rate(ip)
    {
        warn!(%ip, path = %req.uri().path(), "HTTP rate limit exceeded");
        metrics::record_rate_limited("http");
        return ApiError::RateLimited.into_response();
    }
    next.run(req).await
}

/// Abort the handler once the request timeout elapses.
pub async fn request_timeout(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match tokio::time::timeout(state.request_timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(timeout = ?state.request_timeout, "Request timed out");
            ApiError::Timeout.into_response()
        }
    }
}

fn peer_ip(req: &Request) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
