//! Radio Broadcaster Application
//!
//! Serves the listener and controller pages and streams the configured track
//! to every listener once a `start` command arrives.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_radio_broadcaster::{broadcast::BroadcastController, config::AppConfig, ui::WebServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN Radio Broadcaster");

    // Optional config path as the first argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    tracing::info!(
        track = %config.broadcast.track.display(),
        probe = %config.probe.program,
        fallback_bitrate = config.probe.fallback_bitrate,
        "Configuration loaded"
    );

    let controller = Arc::new(BroadcastController::new(&config));
    let web_server = WebServer::new(config, controller.clone());

    web_server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    if let Some(outcome) = controller.stop_broadcast().await {
        tracing::info!(?outcome, "Broadcast stopped on shutdown");
    }

    Ok(())
}
