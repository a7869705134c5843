//! Recording repository: reads the recordings table for merges the listener missed.

use crate::db::catalog::CatalogError;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;

/// A recording row that has no catalog entry yet.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PendingRecording {
    pub id: Uuid,
    pub user_id: String,
    pub video_url: String,
    pub audio_url: String,
    pub source_video_id: Option<String>,
}

/// Window of recordings a sweep looks at.
#[derive(Debug, Clone, Copy)]
pub struct SweepWindow {
    /// Rows younger than this are left to the notification path.
    pub min_age: Duration,
    /// Rows older than this are no longer retried.
    pub max_age: Duration,
    pub limit: i64,
}

#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Oldest first. A recording counts as merged once a catalog entry carries its id.
    async fn pending(&self, window: SweepWindow) -> Result<Vec<PendingRecording>, CatalogError>;
}

#[derive(Clone)]
pub struct RecordingRepository {
    pool: PgPool,
}

impl RecordingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordingStore for RecordingRepository {
    #[tracing::instrument(skip(self), fields(db.table = "recordings"))]
    async fn pending(&self, window: SweepWindow) -> Result<Vec<PendingRecording>, CatalogError> {
        let rows = sqlx::query_as::<Postgres, PendingRecording>(
            r#"
            SELECT r.id, r.user_id, r.video_url, r.audio_url, r.source_video_id
            FROM recordings r
            WHERE r.created_at < NOW() - make_interval(secs => $1)
              AND r.created_at > NOW() - make_interval(secs => $2)
              AND NOT EXISTS (
                  SELECT 1 FROM merged_videos m WHERE m.recording_id = r.id
              )
            ORDER BY r.created_at
            LIMIT $3
            "#,
        )
        .bind(window.min_age.as_secs_f64())
        .bind(window.max_age.as_secs_f64())
        .bind(window.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
