//! Security module.
//!
//! - **Rate Limiting**: Governor-based flood protection for HTTP requests and
//!   realtime connection attempts, keyed by client IP.

pub mod rate_limit;

pub use rate_limit::{RateLimitManager, RateLimitStats};
