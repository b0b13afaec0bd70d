//! Realtime listener and HTTP rate limit configuration.

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use super::defaults::*;

/// Realtime (WebSocket) listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Address to bind to for WebSocket (e.g., "0.0.0.0:3002").
    #[serde(default = "default_realtime_address")]
    pub address: SocketAddr,
    /// Allowed origins for the WebSocket handshake (e.g., `["https://example.com"]`).
    /// Empty list allows all origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
    /// Frames buffered per connection before new frames are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Connections accepted per IP in a burst (refills at one per second).
    #[serde(default = "default_connection_burst_per_ip")]
    pub connection_burst_per_ip: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            address: default_realtime_address(),
            allow_origins: Vec::new(),
            outbound_queue: default_outbound_queue(),
            connection_burst_per_ip: default_connection_burst_per_ip(),
        }
    }
}

/// Per-IP HTTP rate limit: `max_requests` per `window_secs`.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_rate_max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: default_rate_window_secs(),
            max_requests: default_rate_max_requests(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}
