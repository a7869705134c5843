//! Merge orchestrator.
//!
//! Drives one [`MergeJob`] through fetch, compose, thumbnail, publish and record. The
//! orchestrator is shared by every trigger; triggers only build a [`MergeRequest`] and
//! translate the outcome.
//!
//! Guarantees:
//! - the job's scratch directory is gone once `run` returns, whatever the outcome;
//! - at most one merge per source pair runs in this process, and a pair that already
//!   has a catalog entry is rejected with `AlreadyConsumed`;
//! - cancellation is honoured up to the end of publishing and ignored while recording;
//! - publishing and recording run on their own task, so dropping the `run` future after
//!   uploads start still ends in a catalog entry or in compensated uploads.

use crate::catalog_writer::CatalogWriter;
use crate::engine::MuxEngine;
use crate::error::MergeFailure;
use crate::fetcher::{MediaSource, ResourceFetcher};
use crate::job::{MergeJob, MergeState};
use crate::publisher::ArtifactPublisher;
use crate::scratch::ScratchSpace;
use bytes::Bytes;
use chrono::Utc;
use dubmix_core::constants::THUMBNAIL_OFFSET_SECS;
use dubmix_core::{CatalogEntry, Config, MediaKind, MergeResult, PublishedArtifact, SourcePair, TrackRole};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Parent of per-job scratch directories. `None` uses the system temp dir.
    pub scratch_root: Option<PathBuf>,
    pub max_concurrent: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scratch_root: config.scratch_dir().map(PathBuf::from),
            max_concurrent: config.max_concurrent_merges(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            scratch_root: None,
            max_concurrent: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Publish both artifacts and write a catalog entry.
    Persist,
    /// Hand the merged bytes back to the caller. Nothing is stored.
    ReturnArtifacts,
}

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub video: MediaSource,
    pub audio: MediaSource,
    pub owner_id: Option<String>,
    pub source_video_id: Option<String>,
    pub recording_id: Option<Uuid>,
    pub mode: DeliveryMode,
}

impl MergeRequest {
    pub fn from_pair(pair: SourcePair) -> Self {
        Self {
            video: MediaSource::Reference(pair.video),
            audio: MediaSource::Reference(pair.audio),
            owner_id: Some(pair.owner_id),
            source_video_id: pair.source_video_id,
            recording_id: pair.recording_id,
            mode: DeliveryMode::Persist,
        }
    }

    /// In-memory tracks whose merged result goes straight back to the caller.
    pub fn inline(video: Bytes, audio: Bytes) -> Self {
        Self {
            video: MediaSource::Inline {
                bytes: video,
                extension: TrackRole::Video.default_extension().to_string(),
            },
            audio: MediaSource::Inline {
                bytes: audio,
                extension: TrackRole::Audio.default_extension().to_string(),
            },
            owner_id: None,
            source_video_id: None,
            recording_id: None,
            mode: DeliveryMode::ReturnArtifacts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveredArtifacts {
    pub video: Bytes,
    pub thumbnail: Option<Bytes>,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Persisted(CatalogEntry),
    Delivered(DeliveredArtifacts),
}

/// Progress event emitted while a job runs.
#[derive(Debug, Clone)]
pub struct MergeProgress {
    pub job_id: Uuid,
    pub state: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct JobControl {
    pub cancel: CancellationToken,
    pub progress: Option<mpsc::UnboundedSender<MergeProgress>>,
}

impl JobControl {
    pub fn with_progress(progress: mpsc::UnboundedSender<MergeProgress>) -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: Some(progress),
        }
    }
}

/// Idempotence key of a source pair: SHA-256 over both storage keys and the owner.
pub fn source_key(video_key: &str, audio_key: &str, owner_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(video_key.as_bytes());
    hasher.update(b"\n");
    hasher.update(audio_key.as_bytes());
    hasher.update(b"\n");
    hasher.update(owner_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Thumbnail seek position for a video of the given length.
pub fn thumbnail_offset(duration_secs: Option<f64>) -> f64 {
    match duration_secs {
        Some(d) if d < THUMBNAIL_OFFSET_SECS => 0.0,
        _ => THUMBNAIL_OFFSET_SECS,
    }
}

type InFlightSet = Arc<Mutex<HashSet<String>>>;

/// Holds a source key in the in-flight set until dropped.
struct InFlightGuard {
    set: InFlightSet,
    key: String,
}

impl InFlightGuard {
    fn claim(set: &InFlightSet, key: &str) -> Result<Self, MergeFailure> {
        let mut keys = set.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(key.to_string()) {
            return Err(MergeFailure::InFlight);
        }
        Ok(Self {
            set: set.clone(),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut keys = self.set.lock().unwrap_or_else(|e| e.into_inner());
        keys.remove(&self.key);
    }
}

async fn until_cancelled<T, F>(token: &CancellationToken, fut: F) -> Result<T, MergeFailure>
where
    F: Future<Output = Result<T, MergeFailure>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(MergeFailure::Cancelled),
        result = fut => result,
    }
}

pub struct MergeOrchestrator {
    fetcher: ResourceFetcher,
    engine: Arc<dyn MuxEngine>,
    publisher: ArtifactPublisher,
    catalog: CatalogWriter,
    settings: OrchestratorSettings,
    permits: Arc<Semaphore>,
    in_flight: InFlightSet,
}

impl MergeOrchestrator {
    pub fn new(
        fetcher: ResourceFetcher,
        engine: Arc<dyn MuxEngine>,
        publisher: ArtifactPublisher,
        catalog: CatalogWriter,
        settings: OrchestratorSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        Self {
            fetcher,
            engine,
            publisher,
            catalog,
            settings,
            permits,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn catalog(&self) -> &CatalogWriter {
        &self.catalog
    }

    pub fn engine(&self) -> &Arc<dyn MuxEngine> {
        &self.engine
    }

    /// Run one merge to a terminal state.
    pub async fn run(
        &self,
        request: MergeRequest,
        control: JobControl,
    ) -> Result<MergeOutcome, MergeFailure> {
        let mut job = MergeJob::new();
        let span = tracing::info_span!("merge_job", job_id = %job.id, mode = ?request.mode);

        async {
            let start = std::time::Instant::now();
            let result = self.execute(&mut job, &request, &control).await;

            match &result {
                Ok(_) => {
                    tracing::info!(
                        duration_ms = start.elapsed().as_millis(),
                        "Merge completed"
                    );
                }
                Err(failure) => {
                    job.fail(failure.reason_code());
                    log_failure(failure);
                    self.report(&control, &job, failure.to_string());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        job: &mut MergeJob,
        request: &MergeRequest,
        control: &JobControl,
    ) -> Result<MergeOutcome, MergeFailure> {
        let source_key = self.validate(request)?;

        let guard = source_key
            .as_deref()
            .map(|key| InFlightGuard::claim(&self.in_flight, key))
            .transpose()?;

        if let Some(ref key) = source_key {
            if let Some(entry) = self.catalog.find_by_source_key(key).await? {
                return Err(MergeFailure::AlreadyConsumed { entry_id: entry.id });
            }
        }

        let _permit = until_cancelled(&control.cancel, async {
            self.permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| MergeFailure::Internal("Merge slots closed".to_string()))
        })
        .await?;

        let mut scratch = ScratchSpace::create(self.settings.scratch_root.as_deref(), job.id)
            .map_err(|e| MergeFailure::Internal(format!("Failed to create scratch space: {}", e)))?;

        let outcome = self
            .process(job, request, &scratch, source_key, guard, control)
            .await;
        scratch.cleanup();
        outcome
    }

    /// Check the request and derive its idempotence key (persisted merges only).
    fn validate(&self, request: &MergeRequest) -> Result<Option<String>, MergeFailure> {
        if request.mode == DeliveryMode::ReturnArtifacts {
            return Ok(None);
        }

        let (video, audio) = match (request.video.as_reference(), request.audio.as_reference()) {
            (Some(video), Some(audio)) => (video, audio),
            _ => {
                return Err(MergeFailure::InvalidInput(
                    "Persisted merges need stored video and audio".to_string(),
                ))
            }
        };

        let owner_id = request
            .owner_id
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| MergeFailure::InvalidInput("Owner is required".to_string()))?;

        let video_key = self
            .fetcher
            .storage_key(video)
            .map_err(|e| MergeFailure::InvalidInput(format!("video: {}", e)))?;
        let audio_key = self
            .fetcher
            .storage_key(audio)
            .map_err(|e| MergeFailure::InvalidInput(format!("audio: {}", e)))?;

        Ok(Some(source_key(&video_key, &audio_key, owner_id)))
    }

    async fn process(
        &self,
        job: &mut MergeJob,
        request: &MergeRequest,
        scratch: &ScratchSpace,
        source_key: Option<String>,
        guard: Option<InFlightGuard>,
        control: &JobControl,
    ) -> Result<MergeOutcome, MergeFailure> {
        let cancel = &control.cancel;

        job.advance(MergeState::Fetching)?;
        self.report(control, job, "Fetching sources");
        let (video, audio) = until_cancelled(cancel, async {
            tokio::try_join!(
                async {
                    self.fetcher
                        .fetch(scratch, &request.video, TrackRole::Video)
                        .await
                        .map_err(|e| MergeFailure::fetch(TrackRole::Video, e))
                },
                async {
                    self.fetcher
                        .fetch(scratch, &request.audio, TrackRole::Audio)
                        .await
                        .map_err(|e| MergeFailure::fetch(TrackRole::Audio, e))
                },
            )
        })
        .await?;

        job.advance(MergeState::Composing)?;
        self.report(
            control,
            job,
            format!(
                "Composing {} bytes of {} with {} bytes of {}",
                video.size_bytes, video.mime_type, audio.size_bytes, audio.mime_type
            ),
        );
        let output = scratch.output_path();
        let composed = until_cancelled(cancel, async {
            self.engine.ensure_ready().await?;
            Ok::<_, MergeFailure>(self.engine.compose(&video.path, &audio.path, &output).await?)
        })
        .await;
        scratch.remove_file(&video.path).await;
        scratch.remove_file(&audio.path).await;
        let report = composed?;

        let duration_secs = match report.duration_secs {
            Some(d) => Some(d),
            None => self.engine.probe_duration(&output).await.ok(),
        };

        job.advance(MergeState::ThumbnailExtracting)?;
        self.report(control, job, "Extracting thumbnail");
        let thumbnail = self
            .extract_thumbnail(scratch, &output, duration_secs, cancel)
            .await?;

        let merged = tokio::fs::read(&output)
            .await
            .map_err(|e| MergeFailure::Internal(format!("Failed to read merged output: {}", e)))?;
        scratch.remove_file(&output).await;

        if request.mode == DeliveryMode::ReturnArtifacts {
            job.advance(MergeState::Done)?;
            self.report(control, job, "Merge finished");
            return Ok(MergeOutcome::Delivered(DeliveredArtifacts {
                video: Bytes::from(merged),
                thumbnail: thumbnail.map(Bytes::from),
                duration_secs,
            }));
        }

        let owner_id = request
            .owner_id
            .clone()
            .ok_or_else(|| MergeFailure::InvalidInput("Owner is required".to_string()))?;
        let source_key = source_key
            .ok_or_else(|| MergeFailure::Internal("Missing source key".to_string()))?;

        job.advance(MergeState::Publishing)?;
        self.report(control, job, "Publishing merged video");

        let stage = PersistStage {
            publisher: self.publisher.clone(),
            catalog: self.catalog.clone(),
        };
        let input = PersistInput {
            merged,
            thumbnail,
            owner_id,
            source_video_id: request.source_video_id.clone(),
            recording_id: request.recording_id,
            source_key,
            duration_secs,
        };
        let task_control = control.clone();
        let job_id = job.id;
        // Once uploads start they end up recorded or compensated, even if the caller
        // stops waiting for this future.
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                stage.run(job_id, input, &task_control).await
            }
            .in_current_span(),
        );
        let (recording, recorded) = handle
            .await
            .map_err(|e| MergeFailure::Internal(format!("Persist task failed: {}", e)))?;
        if recording {
            job.advance(MergeState::Recording)?;
        }
        let entry = recorded?;

        job.advance(MergeState::Done)?;
        self.report(control, job, "Merge finished");
        Ok(MergeOutcome::Persisted(entry))
    }

    /// Poster frame bytes, or `None` when no frame could be taken. Only cancellation
    /// is an error here.
    async fn extract_thumbnail(
        &self,
        scratch: &ScratchSpace,
        video: &Path,
        duration_secs: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, MergeFailure> {
        let target = scratch.thumbnail_path();
        let mut offsets = vec![thumbnail_offset(duration_secs)];
        if duration_secs.is_none() {
            offsets.push(0.0);
        }

        for at_secs in offsets {
            let extracted = until_cancelled(cancel, async {
                Ok::<_, MergeFailure>(self.engine.extract_thumbnail(video, at_secs, &target).await)
            })
            .await?;

            match extracted {
                Ok(()) => match tokio::fs::read(&target).await {
                    Ok(bytes) if !bytes.is_empty() => {
                        scratch.remove_file(&target).await;
                        return Ok(Some(bytes));
                    }
                    Ok(_) => tracing::warn!(at_secs, "Thumbnail output is empty"),
                    Err(e) => tracing::warn!(at_secs, error = %e, "Failed to read thumbnail"),
                },
                Err(e) => tracing::warn!(at_secs, error = %e, "Thumbnail extraction failed"),
            }
            scratch.remove_file(&target).await;
        }

        Ok(None)
    }

    fn report(&self, control: &JobControl, job: &MergeJob, message: impl Into<String>) {
        send_progress(control, job.id, job.state(), message);
    }
}

fn send_progress(control: &JobControl, job_id: Uuid, state: &MergeState, message: impl Into<String>) {
    if let Some(ref progress) = control.progress {
        let _ = progress.send(MergeProgress {
            job_id,
            state: state.name(),
            message: message.into(),
        });
    }
}

struct PersistInput {
    merged: Vec<u8>,
    thumbnail: Option<Vec<u8>>,
    owner_id: String,
    source_video_id: Option<String>,
    recording_id: Option<Uuid>,
    source_key: String,
    duration_secs: Option<f64>,
}

/// Publishing and recording, run on a task of their own.
struct PersistStage {
    publisher: ArtifactPublisher,
    catalog: CatalogWriter,
}

impl PersistStage {
    /// Returns whether recording was reached, with the outcome.
    async fn run(
        self,
        job_id: Uuid,
        input: PersistInput,
        control: &JobControl,
    ) -> (bool, Result<CatalogEntry, MergeFailure>) {
        let (merged_video, thumbnail) = match self
            .publish_artifacts(input.merged, input.thumbnail, &input.owner_id, &control.cancel)
            .await
        {
            Ok(published) => published,
            Err(failure) => return (false, Err(failure)),
        };

        send_progress(control, job_id, &MergeState::Recording, "Recording merge");
        let (short_id, short_url) = self.catalog.issue_short_link();
        let result = MergeResult {
            merged_video,
            thumbnail,
            owner_id: input.owner_id,
            source_video_id: input.source_video_id,
            recording_id: input.recording_id,
            source_key: input.source_key.clone(),
            is_public: false,
            short_id,
            short_url,
            duration_secs: input.duration_secs,
            created_at: Utc::now(),
        };

        let recorded = match self.catalog.record_merge(result).await {
            Ok(entry) => Ok(entry),
            Err(e) if e.is_source_key_conflict() => {
                match self.catalog.find_by_source_key(&input.source_key).await {
                    Ok(Some(existing)) => Err(MergeFailure::AlreadyConsumed {
                        entry_id: existing.id,
                    }),
                    _ => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        };
        (true, recorded)
    }

    /// Publish the video (required) and the thumbnail (best effort). A cancellation
    /// noticed after uploading removes what was uploaded.
    async fn publish_artifacts(
        &self,
        merged: Vec<u8>,
        thumbnail: Option<Vec<u8>>,
        owner_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(PublishedArtifact, Option<PublishedArtifact>), MergeFailure> {
        if cancel.is_cancelled() {
            return Err(MergeFailure::Cancelled);
        }

        let merged_video = self
            .publisher
            .publish(merged, MediaKind::Video, owner_id)
            .await?;

        let thumbnail = match thumbnail {
            Some(bytes) if !cancel.is_cancelled() => {
                match self
                    .publisher
                    .publish(bytes, MediaKind::Thumbnail, owner_id)
                    .await
                {
                    Ok(artifact) => Some(artifact),
                    Err(e) => {
                        tracing::warn!(error = %e, "Thumbnail publish failed; recording without thumbnail");
                        None
                    }
                }
            }
            _ => None,
        };

        if cancel.is_cancelled() {
            let uploaded: Vec<&PublishedArtifact> =
                std::iter::once(&merged_video).chain(thumbnail.as_ref()).collect();
            for artifact in uploaded {
                if let Err(e) = self.publisher.unpublish(artifact).await {
                    tracing::warn!(error = %e, "Unpublish failed; scheduling compensation");
                    self.catalog
                        .compensate(vec![artifact.key.clone()], "cancelled after publish");
                }
            }
            return Err(MergeFailure::Cancelled);
        }

        Ok((merged_video, thumbnail))
    }
}

fn log_failure(failure: &MergeFailure) {
    let reason = failure.reason_code();
    match failure {
        MergeFailure::EngineUnavailable(_) | MergeFailure::Internal(_) => {
            tracing::error!(reason, error = %failure, "Merge failed");
        }
        MergeFailure::AlreadyConsumed { .. } | MergeFailure::InFlight | MergeFailure::Cancelled => {
            tracing::info!(reason, error = %failure, "Merge not performed");
        }
        _ => {
            tracing::warn!(reason, error = %failure, "Merge failed");
        }
    }
}
