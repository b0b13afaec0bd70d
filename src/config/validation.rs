//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.
//! The backing store address is deliberately not checked here: a malformed
//! address degrades to store-less mode instead of refusing to start.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("database.max_retries must be at least 1")]
    ZeroRetries,
    #[error("realtime.outbound_queue must be at least 1")]
    ZeroOutboundQueue,
    #[error("rate_limit.max_requests must be at least 1")]
    ZeroRateLimit,
    #[error("http and realtime listeners cannot share {0}")]
    SharedListenAddress(std::net::SocketAddr),
    #[error("DATABASE_URI must be set explicitly in production")]
    MissingDatabaseUri,
    #[error("wildcard realtime origin is not allowed in production")]
    WildcardOrigin,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    for (name, value) in [
        ("server.request_timeout_ms", config.server.request_timeout_ms),
        ("server.listen_timeout_ms", config.server.listen_timeout_ms),
        ("shutdown.drain_timeout_ms", config.shutdown.drain_timeout_ms),
        ("database.connect_timeout_ms", config.database.connect_timeout_ms),
        ("database.probe_timeout_ms", config.database.probe_timeout_ms),
        ("rate_limit.window_secs", config.rate_limit.window_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if config.database.max_retries == 0 {
        errors.push(ValidationError::ZeroRetries);
    }
    if config.realtime.outbound_queue == 0 {
        errors.push(ValidationError::ZeroOutboundQueue);
    }
    if config.rate_limit.enabled && config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::ZeroRateLimit);
    }

    // Port 0 means "pick one", so two ephemeral listeners never collide.
    if config.server.address == config.realtime.address && config.server.address.port() != 0 {
        errors.push(ValidationError::SharedListenAddress(config.server.address));
    }

    if config.server.environment.is_production() {
        if config.database.uri.is_none() {
            errors.push(ValidationError::MissingDatabaseUri);
        }
        if config.realtime.allow_origins.iter().any(|o| o == "*") {
            errors.push(ValidationError::WildcardOrigin);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
