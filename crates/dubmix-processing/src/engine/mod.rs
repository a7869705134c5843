//! Mux engine seam.
//!
//! The orchestrator only talks to [`MuxEngine`]. [`FfmpegEngine`] drives the ffmpeg
//! CLI as a subprocess; tests plug in fakes.

mod ffmpeg;

pub use ffmpeg::{FfmpegConfig, FfmpegEngine};

use crate::error::EngineError;
use async_trait::async_trait;
use std::path::Path;

/// What a successful compose produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeReport {
    /// Duration of the composed output, when the engine could measure it.
    pub duration_secs: Option<f64>,
}

#[async_trait]
pub trait MuxEngine: Send + Sync {
    /// Verify the engine can run at all. Failures are `EngineError::Unavailable`.
    async fn ensure_ready(&self) -> Result<(), EngineError>;

    /// Copy the video stream of `video` and the re-encoded audio of `audio` into `output`.
    /// The output runs exactly as long as the video: short audio is padded with silence
    /// and long audio is cut.
    async fn compose(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<ComposeReport, EngineError>;

    /// Duration of a media file in seconds.
    async fn probe_duration(&self, media: &Path) -> Result<f64, EngineError>;

    /// Write a single PNG frame taken at `at_secs` to `output`.
    async fn extract_thumbnail(
        &self,
        video: &Path,
        at_secs: f64,
        output: &Path,
    ) -> Result<(), EngineError>;
}
