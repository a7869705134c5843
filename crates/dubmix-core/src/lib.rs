//! Dubmix Core Library
//!
//! This crate provides the domain models, error types and configuration shared by
//! every dubmix component: the merge pipeline, the catalog, the triggers and the API.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, MergeServiceConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    CatalogEntry, CatalogEntryResponse, MediaKind, MediaReference, MergeResult,
    PublishedArtifact, SourcePair, TrackRole,
};
pub use storage_types::StorageBackend;
// Storage, StorageError and StorageResult live in dubmix-storage.
