use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Catalog row for one merged video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct CatalogEntry {
    pub id: Uuid,
    pub short_id: String,
    pub short_url: Option<String>,
    pub owner_id: String,
    pub video_url: String,
    pub video_key: String,
    pub thumbnail_url: Option<String>,
    pub thumbnail_key: Option<String>,
    pub source_video_id: Option<String>,
    pub source_key: String,
    pub is_public: bool,
    pub status: String,
    pub duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Storage keys owned by this entry, video first.
    pub fn storage_keys(&self) -> Vec<&str> {
        let mut keys = vec![self.video_key.as_str()];
        if let Some(ref thumb) = self.thumbnail_key {
            keys.push(thumb.as_str());
        }
        keys
    }
}

/// Public projection returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntryResponse {
    pub id: Uuid,
    pub video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub owner_id: String,
    pub is_public: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
    pub short_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl From<CatalogEntry> for CatalogEntryResponse {
    fn from(entry: CatalogEntry) -> Self {
        Self {
            id: entry.id,
            video_url: entry.video_url,
            thumbnail_url: entry.thumbnail_url,
            owner_id: entry.owner_id,
            is_public: entry.is_public,
            status: entry.status,
            created_at: entry.created_at,
            short_url: entry.short_url,
            short_id: entry.short_id,
            source_video_id: entry.source_video_id,
            duration_secs: entry.duration_secs,
        }
    }
}
