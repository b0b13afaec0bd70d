//! fblited - fblite server daemon.

use fblite::config::{self, Config};
use fblite::lifecycle::{self, Server};
use fblite::store::SqliteConnector;
use fblite::{fatal, telemetry};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let loaded = Config::load_optional(&config_path)?;
    let found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    config.apply_env_overrides()?;

    telemetry::init(&config.logging)?;
    fatal::install_panic_hook();
    if !found {
        warn!(path = %config_path, "Config file not found, using defaults");
    }

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("refusing to start with {} configuration error(s)", errors.len());
    }

    info!(
        server = %config.server.name,
        environment = config.server.environment.as_str(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting fblite"
    );

    let connector = Arc::new(SqliteConnector::new(&config.database));
    let server = Server::new(config, connector).start().await.map_err(|e| {
        error!(error = %e, "Startup failed");
        e
    })?;

    lifecycle::spawn_signal_listener(Arc::clone(server.coordinator()));

    let report = server.wait_for_shutdown().await;
    if !report.is_clean() {
        anyhow::bail!("shutdown finished with failed steps: {:?}", report.failed_steps);
    }
    info!("fblite stopped");
    Ok(())
}
