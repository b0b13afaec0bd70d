//! Gateway - TCP listener that accepts realtime (WebSocket) clients.
//!
//! The Gateway binds the realtime socket and spawns a Connection task for
//! each client that passes the per-IP connection limit and the Origin check.
//! On shutdown it stops accepting, then waits for live connections to close.

use super::connection::{Connection, ConnectionLimits};
use super::rooms::RoomRegistry;
use crate::config::RealtimeConfig;
use crate::metrics;
use crate::security::RateLimitManager;
use crate::telemetry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, error, info, instrument, warn};
use uuid::Uuid;

/// Upper bound on the WebSocket upgrade after the TCP accept.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts realtime clients and spawns their connection tasks.
pub struct Gateway {
    listener: TcpListener,
    allow_origins: Arc<Vec<String>>,
    limits: ConnectionLimits,
    rooms: Arc<RoomRegistry>,
    rate_limiter: Arc<RateLimitManager>,
    shutdown: CancellationToken,
}

impl Gateway {
    pub async fn bind(
        config: &RealtimeConfig,
        idle_timeout: Duration,
        rooms: Arc<RoomRegistry>,
        rate_limiter: Arc<RateLimitManager>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.address).await?;
        info!(address = %listener.local_addr()?, "Realtime listener bound");

        Ok(Self {
            listener,
            allow_origins: Arc::new(config.allow_origins.clone()),
            limits: ConnectionLimits {
                outbound_queue: config.outbound_queue,
                idle_timeout,
            },
            rooms,
            rate_limiter,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until the shutdown token fires, then drain them.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        let tracker = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "Failed to accept realtime connection");
                    continue;
                }
            };

            if !self.rate_limiter.check_connection_rate(addr.ip()) {
                warn!(%addr, "Realtime connection rate limit exceeded - rejecting");
                metrics::record_rate_limited("realtime");
                drop(stream);
                continue;
            }

            let id = Uuid::new_v4().to_string();
            let span = telemetry::spans::connection(&id, addr);
            tracker.spawn(
                serve_client(
                    id,
                    stream,
                    addr,
                    Arc::clone(&self.allow_origins),
                    Arc::clone(&self.rooms),
                    self.limits,
                    self.shutdown.clone(),
                )
                .instrument(span),
            );
        }

        // Dropping the listener stops new TCP connections at the socket.
        drop(self.listener);
        tracker.close();
        info!(live = tracker.len(), "Realtime listener closed, draining clients");
        tracker.wait().await;
        info!("Realtime clients drained");
        Ok(())
    }
}

async fn serve_client(
    id: String,
    stream: TcpStream,
    addr: SocketAddr,
    allow_origins: Arc<Vec<String>>,
    rooms: Arc<RoomRegistry>,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
) {
    let check_origin = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let origin = req
            .headers()
            .get("Origin")
            .and_then(|o| o.to_str().ok());
        if origin_allowed(&allow_origins, origin) {
            return Ok(response);
        }
        warn!(origin = ?origin, "WebSocket CORS rejected");
        let mut rejection = ErrorResponse::new(Some("CORS origin not allowed".to_string()));
        *rejection.status_mut() = ::http::StatusCode::FORBIDDEN;
        Err(rejection)
    };

    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, accept_hdr_async(stream, check_origin));
    let ws = match handshake.await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            warn!(error = %e, "WebSocket handshake failed");
            return;
        }
        Err(_) => {
            warn!("WebSocket handshake timed out");
            return;
        }
    };

    let connection = Connection::new(id, ws, rooms, limits, shutdown);
    if let Err(e) = connection.run().await {
        error!(error = %e, "Realtime connection error");
    }
}

/// Origin policy for the WebSocket handshake.
///
/// An empty allow-list admits every origin. Requests without an Origin
/// header come from non-browser clients and are admitted.
pub fn origin_allowed(allow_origins: &[String], origin: Option<&str>) -> bool {
    if allow_origins.is_empty() {
        return true;
    }
    match origin {
        None => true,
        Some(origin) => allow_origins.iter().any(|a| a == origin || a == "*"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origins(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_allow_list_admits_all() {
        assert!(origin_allowed(&[], Some("https://evil.example")));
        assert!(origin_allowed(&[], None));
    }

    #[test]
    fn listed_origin_is_admitted() {
        let allow = origins(&["https://app.example"]);
        assert!(origin_allowed(&allow, Some("https://app.example")));
        assert!(!origin_allowed(&allow, Some("https://other.example")));
    }

    #[test]
    fn wildcard_admits_all() {
        let allow = origins(&["*"]);
        assert!(origin_allowed(&allow, Some("https://anything.example")));
    }

    #[test]
    fn missing_origin_is_admitted() {
        let allow = origins(&["https://app.example"]);
        assert!(origin_allowed(&allow, None));
    }
}
