//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::database::DatabaseConfig;
use super::defaults::*;
use super::listen::{RateLimitConfig, RealtimeConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },
}

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listener and process identity.
    #[serde(default)]
    pub server: ServerConfig,
    /// Realtime (WebSocket) listener.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Backing store connection and retry policy.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Graceful shutdown limits.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Per-IP HTTP rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, or `None` when it does not exist.
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Option<Self>, ConfigError> {
        match Self::load(&path) {
            Ok(config) => Ok(Some(config)),
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `PORT`, `REALTIME_PORT`, `DATABASE_URI`, `APP_ENV`, `LOG_FORMAT`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.address.set_port(parse_port("PORT", &port)?);
        }
        if let Some(port) = lookup("REALTIME_PORT") {
            self.realtime.address.set_port(parse_port("REALTIME_PORT", &port)?);
        }
        if let Some(uri) = lookup("DATABASE_URI") {
            self.database.uri = Some(uri);
        }
        if let Some(env) = lookup("APP_ENV") {
            self.server.environment =
                Environment::parse(&env).ok_or(ConfigError::InvalidOverride {
                    key: "APP_ENV",
                    value: env,
                })?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => {
                    return Err(ConfigError::InvalidOverride {
                        key: "LOG_FORMAT",
                        value: format,
                    });
                }
            };
        }
        Ok(())
    }
}

fn parse_port(key: &'static str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidOverride {
            key,
            value: value.to_string(),
        })
}

/// Deployment environment reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// HTTP listener and process identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name reported in logs and the root endpoint.
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default)]
    pub environment: Environment,
    /// Address of the request-serving listener.
    #[serde(default = "default_http_address")]
    pub address: SocketAddr,
    /// Per-request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Idle ceiling for long-lived connections in milliseconds (default: 600000).
    #[serde(default = "default_listen_timeout_ms")]
    pub listen_timeout_ms: u64,
    /// Serve `/metrics` on the HTTP listener.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            environment: Environment::default(),
            address: default_http_address(),
            request_timeout_ms: default_request_timeout_ms(),
            listen_timeout_ms: default_listen_timeout_ms(),
            metrics_enabled: true,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// Hard ceiling for each shutdown step in milliseconds (default: 10000).
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
