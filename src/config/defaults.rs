//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::net::SocketAddr;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "fblite".to_string()
}

pub fn default_http_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

pub fn default_request_timeout_ms() -> u64 {
    30_000
}

pub fn default_listen_timeout_ms() -> u64 {
    600_000
}

// =============================================================================
// Realtime Defaults
// =============================================================================

pub fn default_realtime_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3002))
}

pub fn default_outbound_queue() -> usize {
    256
}

pub fn default_connection_burst_per_ip() -> u32 {
    20
}

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_uri() -> String {
    "sqlite://fblite.db".to_string()
}

pub fn default_max_retries() -> u32 {
    5
}

pub fn default_retry_base_delay_ms() -> u64 {
    5_000
}

pub fn default_connect_timeout_ms() -> u64 {
    5_000
}

pub fn default_probe_timeout_ms() -> u64 {
    2_000
}

pub fn default_max_connections() -> u32 {
    10
}

// =============================================================================
// Shutdown / Rate Limit / Logging Defaults
// =============================================================================

pub fn default_drain_timeout_ms() -> u64 {
    10_000
}

/// 15 minutes.
pub fn default_rate_window_secs() -> u64 {
    900
}

pub fn default_rate_max_requests() -> u32 {
    100
}

pub fn default_log_level() -> String {
    "info".to_string()
}
