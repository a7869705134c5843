//! Dubmix database layer: the merged-video catalog and the recordings it is built from.

pub mod db;

pub use db::catalog::{CatalogError, CatalogRepository, CatalogStore};
pub use db::recordings::{PendingRecording, RecordingRepository, RecordingStore, SweepWindow};
