use anyhow::{Context, Result};
use homegate_client::ApiClient;
use homegate_core::{ScanController, StillFrames};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

mod config;
mod kiosk;

use config::Config;
use kiosk::Kiosk;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("homegated starting");

    let config = Config::from_env()?;
    let api = ApiClient::new(config.api()).context("failed to build HTTP client")?;
    tracing::info!(
        room = %config.room,
        api = %api.base_url(),
        frames = %config.frames_dir.display(),
        "homegated ready"
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let controller = ScanController::new(
        StillFrames::new(config.frames_dir.clone()),
        api.clone(),
        api,
        config.room.clone(),
        config.timings(),
        events_tx,
    )
    .with_jpeg_quality(config.jpeg_quality);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("homegated shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    Kiosk::new(controller, events_rx, config.close_grace())
        .run(shutdown_rx)
        .await
}
