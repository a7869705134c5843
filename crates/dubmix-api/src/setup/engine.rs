//! Mux engine setup

use anyhow::Result;
use dubmix_core::Config;
use dubmix_processing::{FfmpegConfig, FfmpegEngine, MuxEngine};
use std::sync::Arc;
use std::time::Duration;

/// Build the ffmpeg engine and probe it once.
///
/// A missing binary is logged but does not stop startup: the catalog endpoints keep
/// working and every merge fails fast with `ENGINE_UNAVAILABLE`.
pub async fn setup_engine(config: &Config) -> Result<Arc<dyn MuxEngine>> {
    let engine = FfmpegEngine::new(FfmpegConfig {
        ffmpeg_path: config.ffmpeg_path().to_string(),
        ffprobe_path: config.ffprobe_path().to_string(),
        timeout: Duration::from_secs(config.mux_timeout_secs()),
        audio_bitrate_kbps: config.audio_bitrate_kbps(),
    })?;

    match engine.ensure_ready().await {
        Ok(()) => tracing::info!(
            ffmpeg_path = %config.ffmpeg_path(),
            timeout_secs = config.mux_timeout_secs(),
            "Mux engine ready"
        ),
        Err(e) => tracing::error!(
            error = %e,
            ffmpeg_path = %config.ffmpeg_path(),
            "Mux engine unavailable, merges will fail until it is installed"
        ),
    }

    Ok(Arc::new(engine))
}
