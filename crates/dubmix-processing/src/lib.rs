//! Dubmix merge pipeline
//!
//! Resolves a silent clip and a voice-over to local files, muxes them with an external
//! engine, derives a poster frame, publishes both artifacts and records the result in
//! the catalog. Every trigger (store event, HTTP request, in-process worker) drives the
//! same [`MergeOrchestrator`].

pub mod catalog_writer;
pub mod compensation;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod job;
pub mod orchestrator;
pub mod publisher;
pub mod retry;
pub mod scratch;
pub mod short_link;
pub mod trigger;

pub use catalog_writer::CatalogWriter;
pub use compensation::CompensationQueue;
pub use engine::{ComposeReport, FfmpegConfig, FfmpegEngine, MuxEngine};
pub use error::{EngineError, FetchError, MergeFailure, MuxError, PublishError};
pub use fetcher::{LocalBuffer, MediaSource, ResourceFetcher};
pub use job::{MergeJob, MergeState};
pub use orchestrator::{
    DeliveredArtifacts, DeliveryMode, JobControl, MergeOrchestrator, MergeOutcome,
    MergeProgress, MergeRequest, OrchestratorSettings,
};
pub use publisher::ArtifactPublisher;
pub use scratch::ScratchSpace;
pub use short_link::ShortLinker;
pub use trigger::{dispatch, TriggerAdapter};
