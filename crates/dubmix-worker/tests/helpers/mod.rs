#![allow(dead_code)]

use async_trait::async_trait;
use dubmix_processing::{ComposeReport, EngineError, MuxEngine, MuxError};
use std::path::Path;

/// Copies the video and appends the audio, so the result is easy to check.
pub struct ConcatEngine;

#[async_trait]
impl MuxEngine for ConcatEngine {
    async fn ensure_ready(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn compose(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<ComposeReport, EngineError> {
        let mut data = tokio::fs::read(video).await.unwrap();
        let audio = tokio::fs::read(audio).await.unwrap();
        if audio.starts_with(b"corrupt") {
            return Err(MuxError::Decode("Invalid data found when processing input".into()).into());
        }
        data.extend_from_slice(b"+");
        data.extend_from_slice(&audio);
        tokio::fs::write(output, data).await.unwrap();
        Ok(ComposeReport {
            duration_secs: Some(2.0),
        })
    }

    async fn probe_duration(&self, _media: &Path) -> Result<f64, EngineError> {
        Ok(2.0)
    }

    async fn extract_thumbnail(
        &self,
        _video: &Path,
        _at_secs: f64,
        output: &Path,
    ) -> Result<(), EngineError> {
        tokio::fs::write(output, b"png").await.unwrap();
        Ok(())
    }
}
