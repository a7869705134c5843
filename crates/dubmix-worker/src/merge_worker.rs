//! In-process merge worker.
//!
//! Callers post a [`WorkerInput`] holding both tracks as raw bytes. For each input the
//! worker sends zero or more `{log}` messages and then exactly one terminal message,
//! `{outputBlob}` or `{error}`. Inputs are handled one at a time, in order.

use base64::Engine;
use bytes::Bytes;
use dubmix_processing::{
    dispatch, JobControl, MergeFailure, MergeOrchestrator, MergeOutcome, MergeProgress,
    MergeRequest, TriggerAdapter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Message shown to callers when a merge fails. Details stay in the logs.
pub const GENERIC_ERROR: &str = "Failed to merge video and audio";

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInput {
    #[serde(with = "base64_bytes")]
    pub video_file: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub audio_file: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    Log {
        log: String,
    },
    Output {
        #[serde(rename = "outputBlob", with = "base64_bytes")]
        output_blob: Vec<u8>,
    },
    Error {
        error: String,
    },
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerMessage::Log { .. })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InlineMergeAdapter;

impl TriggerAdapter for InlineMergeAdapter {
    type Input = WorkerInput;
    type Output = WorkerMessage;

    fn parse_input(&self, input: WorkerInput) -> Result<MergeRequest, MergeFailure> {
        if input.video_file.is_empty() || input.audio_file.is_empty() {
            return Err(MergeFailure::InvalidInput(
                "Both videoFile and audioFile are required".to_string(),
            ));
        }
        Ok(MergeRequest::inline(
            Bytes::from(input.video_file),
            Bytes::from(input.audio_file),
        ))
    }

    fn emit_result(&self, outcome: MergeOutcome) -> WorkerMessage {
        match outcome {
            MergeOutcome::Delivered(artifacts) => WorkerMessage::Output {
                output_blob: artifacts.video.to_vec(),
            },
            MergeOutcome::Persisted(_) => WorkerMessage::Error {
                error: GENERIC_ERROR.to_string(),
            },
        }
    }

    fn emit_error(&self, failure: MergeFailure) -> WorkerMessage {
        tracing::warn!(reason = failure.reason_code(), error = %failure, "Inline merge failed");
        WorkerMessage::Error {
            error: GENERIC_ERROR.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct MergeWorker {
    orchestrator: Arc<MergeOrchestrator>,
}

/// Channels of a running worker. Dropping `inbox` stops the worker after the current job.
pub struct WorkerHandle {
    pub inbox: mpsc::Sender<WorkerInput>,
    pub outbox: mpsc::UnboundedReceiver<WorkerMessage>,
    pub task: JoinHandle<()>,
}

impl MergeWorker {
    pub fn new(orchestrator: Arc<MergeOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Handle one input, sending logs and the terminal message to `outbox`.
    pub async fn handle(&self, input: WorkerInput, outbox: &mpsc::UnboundedSender<WorkerMessage>) {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<MergeProgress>();

        let forward = {
            let outbox = outbox.clone();
            tokio::spawn(async move {
                while let Some(event) = progress_rx.recv().await {
                    let _ = outbox.send(WorkerMessage::Log {
                        log: format!("[{}] {}", event.state, event.message),
                    });
                }
            })
        };

        let terminal = dispatch(
            &InlineMergeAdapter,
            &self.orchestrator,
            input,
            JobControl::with_progress(progress_tx),
        )
        .await;

        // The progress sender went away with the job; drain remaining logs first.
        if let Err(e) = forward.await {
            tracing::warn!(error = %e, "Progress forwarder stopped unexpectedly");
        }
        let _ = outbox.send(terminal);
    }

    /// Run the worker in the background.
    pub fn spawn(self, capacity: usize) -> WorkerHandle {
        let (inbox, mut inbox_rx) = mpsc::channel::<WorkerInput>(capacity.max(1));
        let (outbox_tx, outbox) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            tracing::info!("Merge worker started");
            while let Some(input) = inbox_rx.recv().await {
                self.handle(input, &outbox_tx).await;
            }
            tracing::info!("Merge worker stopped");
        });

        WorkerHandle {
            inbox,
            outbox,
            task,
        }
    }
}

/// Decode a message produced by the worker, for callers on the other side of a JSON boundary.
pub fn decode_output_blob(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(encoded)
}
