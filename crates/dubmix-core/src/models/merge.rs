use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::{MediaReference, TrackRole};

/// A silent clip and the voice-over recorded against it.
///
/// Created by the recording flow; consumed at most once by a successful merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePair {
    pub video: MediaReference,
    pub audio: MediaReference,
    pub owner_id: String,
    pub source_video_id: Option<String>,
    /// Row in `recordings` this pair came from, when known.
    pub recording_id: Option<Uuid>,
}

impl SourcePair {
    pub fn new(
        video_locator: impl Into<String>,
        audio_locator: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            video: MediaReference::new(video_locator, TrackRole::Video),
            audio: MediaReference::new(audio_locator, TrackRole::Audio),
            owner_id: owner_id.into(),
            source_video_id: None,
            recording_id: None,
        }
    }

    pub fn with_source_video_id(mut self, source_video_id: impl Into<String>) -> Self {
        self.source_video_id = Some(source_video_id.into());
        self
    }

    pub fn with_recording_id(mut self, recording_id: Uuid) -> Self {
        self.recording_id = Some(recording_id);
        self
    }
}

/// A stored artifact: backend key plus the public URL the backend issued for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub key: String,
    pub url: String,
}

/// Everything known about a completed merge, written to the catalog in one insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub merged_video: PublishedArtifact,
    pub thumbnail: Option<PublishedArtifact>,
    pub owner_id: String,
    pub source_video_id: Option<String>,
    pub recording_id: Option<Uuid>,
    pub source_key: String,
    pub is_public: bool,
    pub short_id: String,
    pub short_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
}
