//! Background deletion of orphaned uploads.
//!
//! When a merge uploaded objects but could not record them, the keys are queued here and
//! a single background task deletes them, retrying with backoff.

use crate::retry::backoff_delay;
use dubmix_storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DELETE_MAX_ATTEMPTS: u32 = 5;
const DELETE_RETRY_BASE: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct CompensationTask {
    keys: Vec<String>,
    reason: String,
}

#[derive(Clone)]
pub struct CompensationQueue {
    sender: mpsc::UnboundedSender<CompensationTask>,
}

impl CompensationQueue {
    /// Spawn the deletion task. It runs until every queue handle is dropped.
    pub fn start(storage: Arc<dyn Storage>) -> (Self, JoinHandle<()>) {
        Self::start_with_backoff(storage, DELETE_RETRY_BASE)
    }

    pub fn start_with_backoff(
        storage: Arc<dyn Storage>,
        retry_base: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<CompensationTask>();

        let handle = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                tracing::info!(
                    keys = task.keys.len(),
                    reason = %task.reason,
                    "Compensating orphaned uploads"
                );
                for key in &task.keys {
                    delete_with_retry(storage.as_ref(), key, retry_base).await;
                }
            }
            tracing::debug!("Compensation queue closed");
        });

        (Self { sender }, handle)
    }

    pub fn schedule(&self, keys: Vec<String>, reason: impl Into<String>) {
        if keys.is_empty() {
            return;
        }
        let task = CompensationTask {
            keys,
            reason: reason.into(),
        };
        if let Err(e) = self.sender.send(task) {
            tracing::error!(
                keys = ?e.0.keys,
                "Compensation queue stopped; uploads left orphaned"
            );
        }
    }
}

async fn delete_with_retry(storage: &dyn Storage, key: &str, retry_base: Duration) {
    for attempt in 1..=DELETE_MAX_ATTEMPTS {
        match storage.delete(key).await {
            Ok(()) => {
                tracing::info!(key = %key, "Orphaned upload deleted");
                return;
            }
            Err(e) if attempt < DELETE_MAX_ATTEMPTS => {
                tracing::warn!(key = %key, attempt, error = %e, "Compensating delete failed, retrying");
                tokio::time::sleep(backoff_delay(retry_base, attempt)).await;
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Giving up on orphaned upload");
            }
        }
    }
}
