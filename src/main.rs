use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use athena_router::config::{self, Config, Role};
use athena_router::pool::MemoryPoolBuilder;
use athena_router::DataSourceManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = load_or_default_config();

    let manager = DataSourceManager::new(&config, Arc::new(MemoryPoolBuilder::new()))?;

    // Initial probe so routing has candidates before the first call
    manager.check_health_and_wait().await;
    let mut status: Vec<_> = manager.get_health_status().into_iter().collect();
    status.sort();
    for (name, healthy) in status {
        if healthy {
            info!(datasource = %name, "Datasource healthy");
        } else {
            warn!(datasource = %name, "Datasource unhealthy");
        }
    }
    for role in Role::ALL {
        info!(
            role = %role,
            available = ?manager.get_available_data_sources(role),
            "Routing candidates"
        );
    }

    let shutdown = CancellationToken::new();
    let prober = manager.start(shutdown.clone());

    info!(
        interval_ms = config.health.check_interval_ms,
        read_write_split = config.routing.read_write_split,
        "Athena router running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    if let Err(e) = prober.await {
        warn!(error = %e, "Health prober task failed");
    }
    manager.shutdown().await;

    Ok(())
}

fn load_or_default_config() -> Config {
    // Try to load from config file
    let config_paths = ["config/athena-router.toml", "athena-router.toml"];

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    info!("Using default configuration");
    Config::default()
}
