use async_trait::async_trait;
use dubmix_processing::{ComposeReport, EngineError, MuxEngine, MuxError};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fake video track: a text marker carrying its duration.
pub fn fake_video(duration_secs: f64) -> Vec<u8> {
    format!("video:{}", duration_secs).into_bytes()
}

pub fn fake_audio(duration_secs: f64) -> Vec<u8> {
    format!("audio:{}", duration_secs).into_bytes()
}

fn parse_duration(content: &str, tag: &str) -> Option<f64> {
    content
        .strip_prefix(tag)?
        .split(':')
        .next()?
        .parse()
        .ok()
}

/// Engine stand-in working on the fake track format above.
///
/// `compose` writes `merged:{video duration}:{audio content}`, so the output always
/// runs as long as the video and carries the recorded audio.
#[derive(Default)]
pub struct FakeEngine {
    pub unavailable: bool,
    pub compose_error: Option<MuxError>,
    pub compose_delay: Option<Duration>,
    pub thumbnail_fails: bool,
    pub thumbnail_offsets: Mutex<Vec<f64>>,
    pub compose_calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compose_calls(&self) -> usize {
        self.compose_calls.load(Ordering::SeqCst)
    }

    pub fn thumbnail_offsets(&self) -> Vec<f64> {
        self.thumbnail_offsets.lock().unwrap().clone()
    }
}

async fn read_text(path: &Path) -> Result<String, EngineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| MuxError::Decode(format!("{}: {}", path.display(), e)))?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

#[async_trait]
impl MuxEngine for FakeEngine {
    async fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.unavailable {
            return Err(EngineError::Unavailable("fake engine disabled".to_string()));
        }
        Ok(())
    }

    async fn compose(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<ComposeReport, EngineError> {
        self.compose_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.compose_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref err) = self.compose_error {
            return Err(err.clone().into());
        }

        let video_text = read_text(video).await?;
        let audio_text = read_text(audio).await?;
        let duration = parse_duration(&video_text, "video:")
            .ok_or_else(|| MuxError::Decode("no video stream".to_string()))?;
        if !audio_text.starts_with("audio:") {
            return Err(MuxError::Decode("no audio stream".to_string()).into());
        }

        tokio::fs::write(output, format!("merged:{}:{}", duration, audio_text))
            .await
            .map_err(|e| MuxError::Mux(e.to_string()))?;

        Ok(ComposeReport {
            duration_secs: Some(duration),
        })
    }

    async fn probe_duration(&self, media: &Path) -> Result<f64, EngineError> {
        let text = read_text(media).await?;
        parse_duration(&text, "merged:")
            .or_else(|| parse_duration(&text, "video:"))
            .ok_or_else(|| MuxError::Decode("unknown media".to_string()).into())
    }

    async fn extract_thumbnail(
        &self,
        video: &Path,
        at_secs: f64,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.thumbnail_offsets.lock().unwrap().push(at_secs);
        if self.thumbnail_fails {
            return Err(MuxError::Mux("thumbnail disabled".to_string()).into());
        }

        let duration = self.probe_duration(video).await?;
        if at_secs >= duration {
            return Err(MuxError::Decode("seek past end".to_string()).into());
        }

        tokio::fs::write(output, format!("png:{}", at_secs))
            .await
            .map_err(|e| MuxError::Mux(e.to_string()))?;
        Ok(())
    }
}
