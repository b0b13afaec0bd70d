//! Request-serving HTTP listener.
//!
//! Serves the health surface and Prometheus metrics. Every request passes
//! through the middleware stack, outermost first:
//!
//! ```text
//!   track_requests ─▶ reject_during_shutdown ─▶ rate_limit ─▶ request_timeout ─▶ route
//! ```

mod handlers;
mod middleware;

use crate::config::Config;
use crate::security::RateLimitManager;
use crate::supervisor::Supervisor;
use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state of the HTTP handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Supervisor,
    pub rate_limiter: Arc<RateLimitManager>,
    pub server_name: Arc<str>,
    pub environment: &'static str,
    pub request_timeout: Duration,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: &Config,
        supervisor: Supervisor,
        rate_limiter: Arc<RateLimitManager>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            rate_limiter,
            server_name: Arc::from(config.server.name.as_str()),
            environment: config.server.environment.as_str(),
            request_timeout: config.server.request_timeout(),
            shutdown,
        }
    }
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState, metrics_enabled: bool) -> Router {
    let mut routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/health/db", get(handlers::health_db));
    if metrics_enabled {
        routes = routes.route("/metrics", get(handlers::metrics));
    }

    routes
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(state.clone(), middleware::request_timeout))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(from_fn_with_state(state.clone(), middleware::reject_during_shutdown))
        .layer(from_fn(middleware::track_requests))
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` fires.
///
/// In-flight requests are allowed to finish after the token fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(address = %listener.local_addr()?, "HTTP listener serving");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}
