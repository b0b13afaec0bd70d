//! Prometheus metrics collection for fblite.
//!
//! Exposed on the HTTP listener at `/metrics`.
//!
//! - `fblite_store_connected` - backing store connection flag (gauge)
//! - `fblite_store_connect_attempts_total{result}` - connection attempts
//! - `fblite_realtime_connections` - open realtime connections (gauge)
//! - `fblite_room_fanout` - recipients per room broadcast (histogram)
//! - `fblite_rate_limiter_entries{surface}` - IPs tracked per limiter (gauge)

use crate::security::RateLimitStats;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Backing store
// ========================================================================

pub static STORE_CONNECTED: OnceLock<IntGauge> = OnceLock::new();

pub static STORE_CONNECT_ATTEMPTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Times the supervisor gave up after exhausting its retries.
pub static STORE_RETRIES_EXHAUSTED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Realtime channel
// ========================================================================

pub static REALTIME_CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

pub static ACTIVE_ROOMS: OnceLock<IntGauge> = OnceLock::new();

pub static REALTIME_EVENTS: OnceLock<IntCounterVec> = OnceLock::new();

pub static ROOM_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Frames dropped because a connection's outbound queue was full.
pub static FRAMES_DROPPED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// HTTP / rate limiting
// ========================================================================

pub static HTTP_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();

pub static RATE_LIMITED: OnceLock<IntCounterVec> = OnceLock::new();

/// Tracked IPs per limiter map, sampled after each cleanup.
pub static RATE_LIMITER_ENTRIES: OnceLock<IntGaugeVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; only the first call registers metrics.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(STORE_CONNECTED, IntGauge::new("fblite_store_connected", "Backing store connection flag"));
    register!(STORE_CONNECT_ATTEMPTS, IntCounterVec::new(Opts::new("fblite_store_connect_attempts_total", "Backing store connection attempts"), &["result"]));
    register!(STORE_RETRIES_EXHAUSTED, IntCounter::new("fblite_store_retries_exhausted_total", "Times the store supervisor gave up retrying"));
    register!(REALTIME_CONNECTIONS, IntGauge::new("fblite_realtime_connections", "Open realtime connections"));
    register!(ACTIVE_ROOMS, IntGauge::new("fblite_active_rooms", "Rooms with at least one member"));
    register!(REALTIME_EVENTS, IntCounterVec::new(Opts::new("fblite_realtime_events_total", "Realtime events received by type"), &["event"]));
    register!(ROOM_FANOUT, Histogram::with_opts(
        HistogramOpts::new("fblite_room_fanout", "Recipients per room broadcast")
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0])));
    register!(FRAMES_DROPPED, IntCounter::new("fblite_frames_dropped_total", "Frames dropped due to a full outbound queue"));
    register!(HTTP_REQUESTS, IntCounterVec::new(Opts::new("fblite_http_requests_total", "HTTP requests by method and status"), &["method", "status"]));
    register!(RATE_LIMITED, IntCounterVec::new(Opts::new("fblite_rate_limited_total", "Rate limit rejections"), &["surface"]));
    register!(RATE_LIMITER_ENTRIES, IntGaugeVec::new(Opts::new("fblite_rate_limiter_entries", "IPs tracked per rate limiter map"), &["surface"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions; all are no-ops until `init` has run.
// ============================================================================

#[inline]
pub fn set_store_connected(connected: bool) {
    if let Some(g) = STORE_CONNECTED.get() {
        g.set(i64::from(connected));
    }
}

#[inline]
pub fn record_connect_attempt(success: bool) {
    if let Some(c) = STORE_CONNECT_ATTEMPTS.get() {
        c.with_label_values(&[if success { "success" } else { "failure" }])
            .inc();
    }
}

#[inline]
pub fn record_retries_exhausted() {
    if let Some(c) = STORE_RETRIES_EXHAUSTED.get() {
        c.inc();
    }
}

#[inline]
pub fn realtime_connection_opened() {
    if let Some(g) = REALTIME_CONNECTIONS.get() {
        g.inc();
    }
}

#[inline]
pub fn realtime_connection_closed() {
    if let Some(g) = REALTIME_CONNECTIONS.get() {
        g.dec();
    }
}

#[inline]
pub fn set_active_rooms(count: usize) {
    if let Some(g) = ACTIVE_ROOMS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn record_realtime_event(event: &str) {
    if let Some(c) = REALTIME_EVENTS.get() {
        c.with_label_values(&[event]).inc();
    }
}

#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = ROOM_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[inline]
pub fn record_frame_dropped() {
    if let Some(c) = FRAMES_DROPPED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_http_request(method: &str, status: u16) {
    if let Some(c) = HTTP_REQUESTS.get() {
        c.with_label_values(&[method, &status.to_string()]).inc();
    }
}

#[inline]
pub fn record_rate_limited(surface: &str) {
    if let Some(c) = RATE_LIMITED.get() {
        c.with_label_values(&[surface]).inc();
    }
}

#[inline]
pub fn set_rate_limiter_entries(stats: RateLimitStats) {
    if let Some(g) = RATE_LIMITER_ENTRIES.get() {
        g.with_label_values(&["http"]).set(stats.http_limiters as i64);
        g.with_label_values(&["realtime"]).set(stats.connection_limiters as i64);
    }
}
