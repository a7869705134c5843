use async_trait::async_trait;
use dubmix_processing::{ComposeReport, EngineError, MuxEngine, MuxError};
use std::path::Path;

/// Writes `video+audio` as the merged output and a fixed poster frame.
#[derive(Default)]
pub struct StubEngine {
    pub unavailable: bool,
}

#[async_trait]
impl MuxEngine for StubEngine {
    async fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.unavailable {
            return Err(EngineError::Unavailable("stub engine disabled".to_string()));
        }
        Ok(())
    }

    async fn compose(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<ComposeReport, EngineError> {
        self.ensure_ready().await?;
        let mut data = tokio::fs::read(video)
            .await
            .map_err(|e| MuxError::Decode(e.to_string()))?;
        let audio = tokio::fs::read(audio)
            .await
            .map_err(|e| MuxError::Decode(e.to_string()))?;
        data.push(b'+');
        data.extend_from_slice(&audio);
        tokio::fs::write(output, data)
            .await
            .map_err(|e| MuxError::Mux(e.to_string()))?;
        Ok(ComposeReport {
            duration_secs: Some(5.0),
        })
    }

    async fn probe_duration(&self, _media: &Path) -> Result<f64, EngineError> {
        Ok(5.0)
    }

    async fn extract_thumbnail(
        &self,
        _video: &Path,
        _at_secs: f64,
        output: &Path,
    ) -> Result<(), EngineError> {
        tokio::fs::write(output, b"png")
            .await
            .map_err(|e| MuxError::Mux(e.to_string()))?;
        Ok(())
    }
}
