//! Dubmix background triggers
//!
//! - [`RecordingListener`]: LISTEN/NOTIFY on new recordings, merging each one into the
//!   catalog. Nothing is sent back; failures are logged.
//! - [`RecordingSweep`]: periodic pass merging recordings whose notification was lost.
//! - [`MergeWorker`]: in-process worker that merges raw bytes and answers with progress
//!   logs followed by exactly one terminal message.

pub mod merge_worker;
pub mod recording_listener;
pub mod recording_sweep;

pub use merge_worker::{InlineMergeAdapter, MergeWorker, WorkerHandle, WorkerInput, WorkerMessage};
pub use recording_listener::{RecordingCreated, RecordingEventAdapter, RecordingListener};
pub use recording_sweep::{RecordingSweep, DEFAULT_SWEEP_WINDOW, SWEEP_INTERVAL};
