//! Store-event trigger: merge every newly inserted recording.
//!
//! A database trigger on `recordings` sends the new row as JSON on the recording
//! channel. The listener reconnects after any connection failure and runs each merge
//! in its own task; the orchestrator bounds how many actually run at once. A
//! [`RecordingSweep`] started alongside picks up rows whose notification was lost.

use crate::recording_sweep::{RecordingSweep, SWEEP_INTERVAL};
use dubmix_core::SourcePair;
use dubmix_db::{PendingRecording, RecordingStore};
use dubmix_processing::{
    dispatch, JobControl, MergeFailure, MergeOrchestrator, MergeOutcome, MergeRequest,
    TriggerAdapter,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Notification payload for a new recording row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingCreated {
    pub id: Option<Uuid>,
    pub video_url: String,
    pub audio_url: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub source_video_id: Option<String>,
}

impl RecordingCreated {
    pub fn from_payload(payload: &str) -> Result<Self, MergeFailure> {
        serde_json::from_str(payload)
            .map_err(|e| MergeFailure::InvalidInput(format!("Malformed recording event: {}", e)))
    }
}

impl From<PendingRecording> for RecordingCreated {
    fn from(row: PendingRecording) -> Self {
        Self {
            id: Some(row.id),
            video_url: row.video_url,
            audio_url: row.audio_url,
            user_id: Some(row.user_id),
            source_video_id: row.source_video_id,
        }
    }
}

pub struct RecordingEventAdapter {
    anonymous_owner_id: String,
}

impl RecordingEventAdapter {
    pub fn new(anonymous_owner_id: impl Into<String>) -> Self {
        Self {
            anonymous_owner_id: anonymous_owner_id.into(),
        }
    }
}

impl TriggerAdapter for RecordingEventAdapter {
    type Input = RecordingCreated;
    type Output = ();

    fn parse_input(&self, event: RecordingCreated) -> Result<MergeRequest, MergeFailure> {
        if event.video_url.trim().is_empty() || event.audio_url.trim().is_empty() {
            return Err(MergeFailure::InvalidInput(
                "Recording is missing its video or audio".to_string(),
            ));
        }

        let owner = event
            .user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.anonymous_owner_id.clone());

        tracing::info!(
            recording_id = ?event.id,
            owner_id = %owner,
            "Recording received"
        );

        let mut pair = SourcePair::new(event.video_url, event.audio_url, owner);
        if let Some(source_video_id) = event.source_video_id {
            pair = pair.with_source_video_id(source_video_id);
        }
        if let Some(recording_id) = event.id {
            pair = pair.with_recording_id(recording_id);
        }
        Ok(MergeRequest::from_pair(pair))
    }

    fn emit_result(&self, outcome: MergeOutcome) {
        if let MergeOutcome::Persisted(entry) = outcome {
            tracing::info!(
                entry_id = %entry.id,
                short_id = %entry.short_id,
                "Recording merged"
            );
        }
    }

    fn emit_error(&self, failure: MergeFailure) {
        match failure {
            MergeFailure::AlreadyConsumed { entry_id } => {
                tracing::info!(entry_id = %entry_id, "Recording already merged, skipping");
            }
            MergeFailure::InFlight => {
                tracing::info!("Recording merge already running, skipping");
            }
            other => {
                tracing::error!(
                    reason = other.reason_code(),
                    retryable = other.is_retryable(),
                    error = %other,
                    "Recording merge failed"
                );
            }
        }
    }
}

pub struct RecordingListener {
    shutdown_txs: Vec<mpsc::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl RecordingListener {
    /// Listen on `channel` and sweep `recordings` every few minutes. Runs until
    /// [`RecordingListener::shutdown`] is called.
    pub fn start(
        pool: sqlx::PgPool,
        channel: String,
        recordings: Arc<dyn RecordingStore>,
        orchestrator: Arc<MergeOrchestrator>,
        adapter: RecordingEventAdapter,
    ) -> Self {
        let adapter = Arc::new(adapter);
        let (listen_tx, listen_rx) = mpsc::channel(1);
        let (sweep_tx, sweep_rx) = mpsc::channel(1);

        let sweep = RecordingSweep::new(recordings, orchestrator.clone(), adapter.clone());
        let listen_task = tokio::spawn(async move {
            Self::listen_loop(pool, channel, orchestrator, adapter, listen_rx).await;
        });
        let sweep_task = tokio::spawn(sweep.run(SWEEP_INTERVAL, sweep_rx));

        Self {
            shutdown_txs: vec![listen_tx, sweep_tx],
            tasks: vec![listen_task, sweep_task],
        }
    }

    /// Stop listening and sweeping, and wait for both loops to exit.
    pub async fn shutdown(self) {
        for tx in &self.shutdown_txs {
            let _ = tx.send(()).await;
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Recording trigger task ended abnormally");
            }
        }
    }

    async fn listen_loop(
        pool: sqlx::PgPool,
        channel: String,
        orchestrator: Arc<MergeOrchestrator>,
        adapter: Arc<RecordingEventAdapter>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(channel = %channel, "Recording listener started");

        loop {
            let mut listener = match sqlx::postgres::PgListener::connect_with(&pool).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::warn!(error = %e, "PgListener connect failed, will retry");
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                    }
                }
            };

            if let Err(e) = listener.listen(&channel).await {
                tracing::warn!(error = %e, "LISTEN failed, will retry");
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                }
            }

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Recording listener shutting down");
                        return;
                    }
                    notification = listener.recv() => match notification {
                        Ok(notification) => {
                            let event = match RecordingCreated::from_payload(notification.payload()) {
                                Ok(event) => event,
                                Err(failure) => {
                                    adapter.emit_error(failure);
                                    continue;
                                }
                            };
                            let orchestrator = orchestrator.clone();
                            let adapter = adapter.clone();
                            tokio::spawn(async move {
                                dispatch(adapter.as_ref(), &orchestrator, event, JobControl::default()).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Recording listener connection lost, reconnecting");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Recording listener stopped");
    }
}
