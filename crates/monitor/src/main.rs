//! Drowsiness Monitor - Main Entry Point
//!
//! Usage: `drowsiness-monitor [config.toml]`

use monitor::{init_logging, run, Settings};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    init_logging(&settings.log)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "threshold={:.2}, frames={}, camera {}x{} @ {}fps",
        settings.dms.drowsiness.threshold,
        settings.dms.drowsiness.consecutive_frames_required,
        settings.camera.width,
        settings.camera.height,
        settings.camera.fps
    );

    let summary = run(settings).await?;
    info!(
        "Processed {} frames, {} drowsiness alarms",
        summary.frames_processed, summary.alarms_started
    );

    Ok(())
}
