//! ffmpeg CLI engine.

use super::{ComposeReport, MuxEngine};
use crate::error::{EngineError, MuxError};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

/// How long `ffmpeg -version` may take during the readiness probe.
const READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes of stderr kept in error messages.
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Hard limit for every engine invocation.
    pub timeout: Duration,
    pub audio_bitrate_kbps: u32,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            timeout: Duration::from_secs(300),
            audio_bitrate_kbps: 128,
        }
    }
}

pub struct FfmpegEngine {
    config: FfmpegConfig,
    readiness: OnceCell<Result<String, String>>,
}

/// Reject executable paths that contain shell metacharacters or traversal.
fn validate_executable(path: &str) -> anyhow::Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.is_empty() || path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow::anyhow!(
            "Invalid executable path: contains dangerous characters: {}",
            path
        ));
    }
    if path.contains("..") {
        return Err(anyhow::anyhow!(
            "Invalid executable path: contains directory traversal: {}",
            path
        ));
    }
    Ok(())
}

impl FfmpegEngine {
    pub fn new(config: FfmpegConfig) -> anyhow::Result<Self> {
        validate_executable(&config.ffmpeg_path)?;
        validate_executable(&config.ffprobe_path)?;
        if config.timeout.is_zero() {
            return Err(anyhow::anyhow!("Engine timeout must be greater than zero"));
        }

        Ok(Self {
            config,
            readiness: OnceCell::new(),
        })
    }

    /// Run `program` with `args`, killing it if it outlives `limit`.
    ///
    /// The child is spawned with `kill_on_drop`, so dropping this future (timeout or
    /// job cancellation) also terminates the process.
    async fn run(
        program: &str,
        args: &[String],
        limit: Duration,
    ) -> Result<Output, EngineError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Unavailable(format!("Failed to start {}: {}", program, e)))?;

        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(MuxError::Mux(format!("Failed waiting for {}: {}", program, e)).into()),
            Err(_) => Err(MuxError::Timeout {
                after_secs: limit.as_secs().max(1),
            }
            .into()),
        }
    }

    async fn run_ffmpeg(&self, args: Vec<String>, operation: &str) -> Result<(), EngineError> {
        let start = std::time::Instant::now();
        let output = Self::run(&self.config.ffmpeg_path, &args, self.config.timeout).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let error = classify_stderr(&stderr);
            tracing::warn!(
                operation = operation,
                exit_code = ?output.status.code(),
                duration_ms = start.elapsed().as_millis(),
                error = %error,
                "FFmpeg invocation failed"
            );
            return Err(error.into());
        }

        tracing::debug!(
            operation = operation,
            duration_ms = start.elapsed().as_millis(),
            "FFmpeg invocation completed"
        );
        Ok(())
    }
}

/// Arguments for the fixed merge policy: copy video, re-encode audio to AAC, pad or
/// cut the audio so the output length follows the video.
fn compose_args(video: &Path, audio: &Path, output: &Path, audio_bitrate_kbps: u32) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-i".to_string(),
        audio.to_string_lossy().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", audio_bitrate_kbps),
        "-af".to_string(),
        "apad".to_string(),
        "-shortest".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

fn thumbnail_args(video: &Path, at_secs: f64, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-ss".to_string(),
        format!("{:.3}", at_secs.max(0.0)),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-c:v".to_string(),
        "png".to_string(),
        "-f".to_string(),
        "image2".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

fn probe_args(media: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        media.to_string_lossy().to_string(),
    ]
}

/// Map ffmpeg's stderr to a failure class.
fn classify_stderr(stderr: &str) -> MuxError {
    let tail = stderr_tail(stderr);
    let lower = stderr.to_lowercase();

    const DECODE_MARKERS: [&str; 8] = [
        "invalid data found when processing input",
        "could not find codec parameters",
        "error while decoding",
        "moov atom not found",
        "no such file or directory",
        "does not contain any stream",
        "matches no streams",
        "end of file",
    ];
    const ENCODE_MARKERS: [&str; 4] = [
        "error while opening encoder",
        "unknown encoder",
        "error initializing output stream",
        "encoder not found",
    ];

    if DECODE_MARKERS.iter().any(|m| lower.contains(m)) {
        MuxError::Decode(tail)
    } else if ENCODE_MARKERS.iter().any(|m| lower.contains(m)) {
        MuxError::Encode(tail)
    } else {
        MuxError::Mux(tail)
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

fn parse_probe_duration(stdout: &[u8]) -> Result<f64, MuxError> {
    let probe: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| MuxError::Decode(format!("Failed to parse ffprobe output: {}", e)))?;

    probe["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| MuxError::Decode("Could not parse duration".to_string()))
}

#[async_trait]
impl MuxEngine for FfmpegEngine {
    async fn ensure_ready(&self) -> Result<(), EngineError> {
        let readiness = self
            .readiness
            .get_or_init(|| async {
                let args = vec!["-version".to_string()];
                match Self::run(&self.config.ffmpeg_path, &args, READINESS_TIMEOUT).await {
                    Ok(output) if output.status.success() => {
                        let version = String::from_utf8_lossy(&output.stdout)
                            .lines()
                            .next()
                            .unwrap_or_default()
                            .to_string();
                        tracing::info!(version = %version, "FFmpeg engine ready");
                        Ok(version)
                    }
                    Ok(output) => Err(format!(
                        "{} -version exited with {:?}",
                        self.config.ffmpeg_path,
                        output.status.code()
                    )),
                    Err(e) => Err(e.to_string()),
                }
            })
            .await;

        readiness.as_ref().map(|_| ()).map_err(|msg| {
            tracing::error!(error = %msg, "FFmpeg engine unavailable");
            EngineError::Unavailable(msg.clone())
        })
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "compose"
    ))]
    async fn compose(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<ComposeReport, EngineError> {
        let args = compose_args(video, audio, output, self.config.audio_bitrate_kbps);
        self.run_ffmpeg(args, "compose").await?;

        let duration_secs = match self.probe_duration(output).await {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(error = %e, "Could not probe composed output duration");
                None
            }
        };

        Ok(ComposeReport { duration_secs })
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        ffmpeg.operation = "probe"
    ))]
    async fn probe_duration(&self, media: &Path) -> Result<f64, EngineError> {
        let output =
            Self::run(&self.config.ffprobe_path, &probe_args(media), self.config.timeout).await?;

        if !output.status.success() {
            return Err(classify_stderr(&String::from_utf8_lossy(&output.stderr)).into());
        }

        Ok(parse_probe_duration(&output.stdout)?)
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "thumbnail"
    ))]
    async fn extract_thumbnail(
        &self,
        video: &Path,
        at_secs: f64,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.run_ffmpeg(thumbnail_args(video, at_secs, output), "thumbnail")
            .await?;

        // ffmpeg exits 0 without writing a frame when the seek lands past the end.
        let written = tokio::fs::metadata(output)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(MuxError::Decode(format!("No frame available at {:.3}s", at_secs)).into());
        }

        Ok(())
    }
}
