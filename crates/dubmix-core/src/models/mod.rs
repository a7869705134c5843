//! Data models for the merge pipeline and the catalog.

mod catalog;
mod media;
mod merge;

pub use catalog::{CatalogEntry, CatalogEntryResponse};
pub use media::{MediaKind, MediaReference, TrackRole};
pub use merge::{MergeResult, PublishedArtifact, SourcePair};
