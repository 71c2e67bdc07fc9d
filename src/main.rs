use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use clickstat::analytics::{ClickAggregator, Enricher};
use clickstat::api;
use clickstat::config::Config;
use clickstat::storage::{self, LockManager, LockOptions};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize counter store
    let (store, lock_backend) = storage::connect(&config.store).await?;
    info!("Counter store ready");

    let lock_options = LockOptions::from(&config.lock);
    info!(
        "Locks: lease {:?}, acquire timeout {:?}",
        lock_options.lease, lock_options.acquire_timeout
    );

    let enricher = Enricher::from_config(&config.analytics)?;
    let aggregator = Arc::new(ClickAggregator::new(
        enricher,
        store,
        LockManager::new(lock_backend, lock_options),
        config.analytics.track_ip,
    ));

    if config.analytics.track_ip {
        info!("Client IPs are counted as ip:<address> fields");
    }

    let app = api::create_api_router(Arc::clone(&aggregator), config.analytics.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Click counter listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Dropping the last handle closes the store connection
    drop(aggregator);
    info!("Counter store connection closed");

    Ok(())
}
