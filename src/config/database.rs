//! Backing store configuration.

use serde::Deserialize;
use std::time::Duration;

use super::defaults::*;

/// Backing store connection and retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Store address (e.g. `sqlite://fblite.db`). `None` uses the built-in default.
    pub uri: Option<String>,
    /// Consecutive failed attempts before the supervisor gives up (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retry delay unit; attempt `n` waits `n * base` (default: 5000).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Ceiling for a single connection attempt (default: 5000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Ceiling for a health probe (default: 2000).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Pool size (default: 10).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: None,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// The configured address, or the default one.
    pub fn address(&self) -> String {
        self.uri.clone().unwrap_or_else(default_database_uri)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
