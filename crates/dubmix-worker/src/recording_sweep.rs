//! Periodic pass over `recordings` for rows the notification path missed.
//!
//! Notifications sent while the listener is reconnecting, or while the process is down,
//! are lost. The sweep reads recordings that no catalog entry claims yet and merges them
//! through the same adapter. A pair that was merged meanwhile ends as `AlreadyConsumed`.

use crate::recording_listener::{RecordingCreated, RecordingEventAdapter};
use dubmix_db::{CatalogError, RecordingStore, SweepWindow};
use dubmix_processing::{dispatch, JobControl, MergeOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub const DEFAULT_SWEEP_WINDOW: SweepWindow = SweepWindow {
    min_age: Duration::from_secs(60),
    max_age: Duration::from_secs(24 * 60 * 60),
    limit: 50,
};

pub struct RecordingSweep {
    store: Arc<dyn RecordingStore>,
    orchestrator: Arc<MergeOrchestrator>,
    adapter: Arc<RecordingEventAdapter>,
    window: SweepWindow,
}

impl RecordingSweep {
    pub fn new(
        store: Arc<dyn RecordingStore>,
        orchestrator: Arc<MergeOrchestrator>,
        adapter: Arc<RecordingEventAdapter>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            adapter,
            window: DEFAULT_SWEEP_WINDOW,
        }
    }

    pub fn with_window(mut self, window: SweepWindow) -> Self {
        self.window = window;
        self
    }

    /// Merge every pending recording in the window, one after another. Returns how many
    /// were picked up.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<usize, CatalogError> {
        let pending = self.store.pending(self.window).await?;
        let count = pending.len();
        if count > 0 {
            tracing::info!(count, "Merging recordings missed by the listener");
        }

        for recording in pending {
            dispatch(
                self.adapter.as_ref(),
                &self.orchestrator,
                RecordingCreated::from(recording),
                JobControl::default(),
            )
            .await;
        }
        Ok(count)
    }

    /// Sweep now and then every `interval` until shutdown.
    pub(crate) async fn run(self, interval: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::warn!(error = %e, "Recording sweep failed, will retry");
                    }
                }
            }
        }

        tracing::info!("Recording sweep stopped");
    }
}
