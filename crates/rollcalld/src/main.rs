use anyhow::{Context, Result};
use rollcall_core::{AttendanceLedger, Gallery, RecognitionService};
use rollcall_vision::OnnxFaceExtractor;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");
    let config = Config::from_env();

    let mut extractor = OnnxFaceExtractor::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;

    let gallery = Gallery::load(&config.dataset_dir, &mut extractor)?;
    if gallery.is_empty() {
        tracing::warn!(path = %config.dataset_dir.display(), "gallery is empty; nobody can be recognized");
    }

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let ledger = AttendanceLedger::open(&config.db_path)?;

    let service = Arc::new(RecognitionService::new(
        Arc::new(gallery),
        Arc::new(ledger),
        config.window,
        config.distance_threshold,
    ));
    tracing::info!(
        window = %config.window,
        threshold = config.distance_threshold,
        "attendance policy"
    );

    let engine = engine::spawn_engine(extractor, Arc::clone(&service))?;
    let iface = AttendanceService::new(engine, service);

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, iface)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "rollcalld ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
