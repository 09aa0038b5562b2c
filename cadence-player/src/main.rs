//! Cadence Player - Main entry point
//!
//! Loads configuration, registers the local catalog extension, starts the
//! queue/sink components and serves the HTTP API until Ctrl+C or SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_player::backend::catalog::DEFAULT_CATALOG_ID;
use cadence_player::backend::{CatalogExtension, ExtensionRegistry};
use cadence_player::config::{Args, Config};
use cadence_player::{api, Player};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config load warnings go through a stderr logger until the configured one exists
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || Config::from_args(&args))
        .context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "cadence_player={level},cadence_common={level},tower_http=info",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cadence player v{}", env!("CARGO_PKG_VERSION"));

    let mut registry = ExtensionRegistry::new();
    match &config.catalog_path {
        Some(path) => {
            let catalog = CatalogExtension::load(DEFAULT_CATALOG_ID, path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            registry.register(Arc::new(catalog));
        }
        None => warn!("No catalog configured; searches will fail until an extension is bound"),
    }

    let player = Player::start(registry, config.session.clone(), &config.sink);
    if let Some(id) = player
        .session
        .bind_default()
        .await
        .context("Failed to bind default extension")?
    {
        info!("Active extension: {}", id);
    }

    let shutdown = player.shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    let served = api::run(config.port, player.context()).await;
    player.stop().await;
    served.context("HTTP server failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
