//! Rate limiting for flood protection.
//!
//! Provides governor-based rate limiting for:
//! - HTTP requests per IP (`max_requests` per window)
//! - Realtime connection attempts per IP
//!
//! Each limiter type has its own storage so the two surfaces never share
//! a budget.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovRateLimiter};
use nonzero_ext::nonzero;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// Entries kept per limiter map before `cleanup` clears it.
const MAX_ENTRIES: usize = 10_000;

/// Thread-safe rate limit manager using governor.
#[derive(Debug)]
pub struct RateLimitManager {
    /// Per-IP HTTP request limiters.
    http_limiters: DashMap<IpAddr, DirectRateLimiter>,
    /// Per-IP realtime connection limiters.
    connection_limiters: DashMap<IpAddr, DirectRateLimiter>,
    http_quota: Quota,
    connection_quota: Quota,
    http_enabled: bool,
}

impl RateLimitManager {
    pub fn new(config: &RateLimitConfig, connection_burst_per_ip: u32) -> Self {
        Self {
            http_limiters: DashMap::new(),
            connection_limiters: DashMap::new(),
            http_quota: http_quota(config.window(), config.max_requests),
            connection_quota: connection_quota(connection_burst_per_ip),
            http_enabled: config.enabled,
        }
    }

    /// Check if an IP may make another HTTP request.
    ///
    /// Returns `true` if allowed, `false` if rate limited.
    pub fn check_http_rate(&self, ip: IpAddr) -> bool {
        if !self.http_enabled {
            return true;
        }
        let limiter = self
            .http_limiters
            .entry(ip)
            .or_insert_with(|| GovRateLimiter::direct(self.http_quota));

        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(ip = %ip, "http rate limit exceeded");
        }
        allowed
    }

    /// Check if an IP can open a new realtime connection.
    pub fn check_connection_rate(&self, ip: IpAddr) -> bool {
        let limiter = self
            .connection_limiters
            .entry(ip)
            .or_insert_with(|| GovRateLimiter::direct(self.connection_quota));

        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(ip = %ip, "connection rate limit exceeded");
        }
        allowed
    }

    /// Cleanup old entries to prevent memory growth.
    ///
    /// Clearing resets every IP to a full budget, which is acceptable for a
    /// map that only grows under address churn.
    pub fn cleanup(&self) {
        if self.http_limiters.len() > MAX_ENTRIES {
            self.http_limiters.clear();
            debug!("cleared http rate limiters (exceeded {} entries)", MAX_ENTRIES);
        }
        if self.connection_limiters.len() > MAX_ENTRIES {
            self.connection_limiters.clear();
            debug!("cleared connection rate limiters (exceeded {} entries)", MAX_ENTRIES);
        }
    }

    /// Sizes of the limiter maps, published as a gauge after each cleanup.
    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            http_limiters: self.http_limiters.len(),
            connection_limiters: self.connection_limiters.len(),
        }
    }
}

/// `max_requests` spread evenly over `window`, all of it available up front.
fn http_quota(window: Duration, max_requests: u32) -> Quota {
    let max = NonZeroU32::new(max_requests).unwrap_or(nonzero!(100u32));
    let period = window / max.get();
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(max))
        .allow_burst(max)
}

/// One connection per second with burst.
fn connection_quota(burst: u32) -> Quota {
    let burst = NonZeroU32::new(burst).unwrap_or(nonzero!(3u32));
    Quota::per_second(nonzero!(1u32)).allow_burst(burst)
}

/// Rate limiter statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    pub http_limiters: usize,
    pub connection_limiters: usize,
}
