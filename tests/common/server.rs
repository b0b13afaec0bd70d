//! Test server management.
//!
//! Runs fblite in-process with both listeners on `127.0.0.1:0`.

use fblite::config::Config;
use fblite::store::SqliteConnector;
use fblite::{RunningServer, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;

/// A test server instance. The database lives as long as the server.
pub struct TestServer {
    pub server: RunningServer,
    _data_dir: TempDir,
}

impl TestServer {
    /// Server with a reachable SQLite store.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(|_| {}).await
    }

    /// Server whose store address is malformed, so it runs store-less.
    pub async fn spawn_without_store() -> anyhow::Result<Self> {
        Self::spawn_with(|config| {
            config.database.uri = Some("postgres://nowhere/db".to_string());
        })
        .await
    }

    /// Server built from the test defaults after `customize` has run.
    pub async fn spawn_with(customize: impl FnOnce(&mut Config)) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let mut config = test_config(&data_dir);
        customize(&mut config);

        let connector = Arc::new(SqliteConnector::new(&config.database));
        let server = Server::new(config, connector).start().await?;
        Ok(Self {
            server,
            _data_dir: data_dir,
        })
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.server.http_addr(), path)
    }

    pub fn realtime_addr(&self) -> SocketAddr {
        self.server.realtime_addr()
    }
}

fn test_config(data_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.server.name = "fblite-test".to_string();
    config.server.address = "127.0.0.1:0".parse().unwrap();
    config.realtime.address = "127.0.0.1:0".parse().unwrap();
    config.realtime.connection_burst_per_ip = 1000;
    config.rate_limit.max_requests = 1000;
    config.shutdown.drain_timeout_ms = 2000;
    config.database.uri = Some(format!(
        "sqlite://{}",
        data_dir.path().join("test.db").display()
    ));
    config
}
