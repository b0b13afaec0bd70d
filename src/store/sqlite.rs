//! SQLite backing store via SQLx.

use super::{Connector, Session, SessionInfo, StoreError, redact_address};
use crate::config::DatabaseConfig;
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Opens pooled SQLite sessions.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl SqliteConnector {
    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections.max(1),
            acquire_timeout: config.connect_timeout(),
        }
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn open(&self, address: &str) -> Result<Arc<dyn Session>, StoreError> {
        let options = SqliteConnectOptions::from_str(address)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(Some(Self::IDLE_TIMEOUT))
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        // WAL lets health probes read while writes are in progress.
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

        let target = redact_address(address);
        info!(target = %target, "SQLite pool opened");
        Ok(Arc::new(SqliteSession { pool, target }))
    }
}

/// A pooled SQLite session.
pub struct SqliteSession {
    pool: SqlitePool,
    target: String,
}

#[async_trait]
impl Session for SqliteSession {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Probe(e.to_string()))
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Disconnect("pool already closed".to_string()));
        }
        self.pool.close().await;
        debug!(target = %self.target, "SQLite pool closed");
        Ok(())
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            backend: "sqlite",
            target: self.target.clone(),
        }
    }
}
