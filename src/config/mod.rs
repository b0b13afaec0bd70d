//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, ShutdownConfig, LoggingConfig)
//! - [`listen`]: Realtime listener and HTTP rate limit configuration
//! - [`database`]: Backing store address and retry policy
//! - [`validation`]: Startup validation
//! - [`defaults`]: serde default functions

mod database;
mod defaults;
mod listen;
mod types;
mod validation;

pub use database::DatabaseConfig;
pub use listen::{RateLimitConfig, RealtimeConfig};
pub use types::{
    Config, ConfigError, Environment, LogFormat, LoggingConfig, ServerConfig, ShutdownConfig,
};
pub use validation::{ValidationError, validate};
