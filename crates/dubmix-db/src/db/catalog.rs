//! Catalog repository: CRUD for the merged_videos table.

use async_trait::async_trait;
use dubmix_core::constants::CATALOG_STATUS_READY;
use dubmix_core::{AppError, CatalogEntry, MergeResult};
use sqlx::{PgPool, Postgres};
use thiserror::Error;
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "id, short_id, short_url, owner_id, video_url, video_key, \
    thumbnail_url, thumbnail_key, source_video_id, source_key, is_public, status, \
    duration_secs, created_at";

#[derive(Debug, Error)]
pub enum CatalogError {
    /// A unique constraint rejected the row (same source pair or short id).
    #[error("Duplicate catalog entry ({constraint})")]
    Duplicate { constraint: String },

    /// The database could not be reached; the same write may succeed later.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog query failed: {0}")]
    Query(String),
}

impl CatalogError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Unavailable(_))
    }

    pub fn is_source_key_conflict(&self) -> bool {
        matches!(self, CatalogError::Duplicate { constraint } if constraint.contains("source_key"))
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => CatalogError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::WorkerCrashed => CatalogError::Unavailable(err.to_string()),
            other => CatalogError::Query(other.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Duplicate { constraint } => {
                AppError::Conflict(format!("Catalog entry already exists ({})", constraint))
            }
            CatalogError::Unavailable(msg) | CatalogError::Query(msg) => {
                AppError::Internal(format!("Catalog error: {}", msg))
            }
        }
    }
}

/// Persistence seam for catalog entries.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert one completed merge. All fields are written in a single statement.
    async fn insert(&self, result: &MergeResult) -> Result<CatalogEntry, CatalogError>;

    async fn get(&self, id: Uuid) -> Result<Option<CatalogEntry>, CatalogError>;

    async fn find_by_short_id(&self, short_id: &str) -> Result<Option<CatalogEntry>, CatalogError>;

    async fn find_by_source_key(
        &self,
        source_key: &str,
    ) -> Result<Option<CatalogEntry>, CatalogError>;

    /// Update only `is_public`. Returns `None` when no entry with that id belongs to `owner_id`.
    async fn set_visibility(
        &self,
        id: Uuid,
        owner_id: &str,
        is_public: bool,
    ) -> Result<Option<CatalogEntry>, CatalogError>;

    /// Remove the record. Returns false when nothing matched.
    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool, CatalogError>;

    async fn list_public(&self, limit: i64, offset: i64) -> Result<Vec<CatalogEntry>, CatalogError>;

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// Postgres-backed catalog.
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    #[tracing::instrument(skip(self, result), fields(db.table = "merged_videos", owner_id = %result.owner_id))]
    async fn insert(&self, result: &MergeResult) -> Result<CatalogEntry, CatalogError> {
        let sql = format!(
            r#"
            INSERT INTO merged_videos (
                id, short_id, short_url, owner_id, video_url, video_key,
                thumbnail_url, thumbnail_key, source_video_id, recording_id, source_key,
                is_public, status, duration_secs, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );

        let entry = sqlx::query_as::<Postgres, CatalogEntry>(&sql)
            .bind(Uuid::new_v4())
            .bind(&result.short_id)
            .bind(&result.short_url)
            .bind(&result.owner_id)
            .bind(&result.merged_video.url)
            .bind(&result.merged_video.key)
            .bind(result.thumbnail.as_ref().map(|t| t.url.as_str()))
            .bind(result.thumbnail.as_ref().map(|t| t.key.as_str()))
            .bind(&result.source_video_id)
            .bind(result.recording_id)
            .bind(&result.source_key)
            .bind(result.is_public)
            .bind(CATALOG_STATUS_READY)
            .bind(result.duration_secs)
            .bind(result.created_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(entry)
    }

    #[tracing::instrument(skip(self), fields(db.table = "merged_videos", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<CatalogEntry>, CatalogError> {
        let sql = format!("SELECT {} FROM merged_videos WHERE id = $1", ENTRY_COLUMNS);
        let entry = sqlx::query_as::<Postgres, CatalogEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    #[tracing::instrument(skip(self), fields(db.table = "merged_videos"))]
    async fn find_by_short_id(&self, short_id: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let sql = format!(
            "SELECT {} FROM merged_videos WHERE short_id = $1",
            ENTRY_COLUMNS
        );
        let entry = sqlx::query_as::<Postgres, CatalogEntry>(&sql)
            .bind(short_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    #[tracing::instrument(skip(self), fields(db.table = "merged_videos"))]
    async fn find_by_source_key(
        &self,
        source_key: &str,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        let sql = format!(
            "SELECT {} FROM merged_videos WHERE source_key = $1",
            ENTRY_COLUMNS
        );
        let entry = sqlx::query_as::<Postgres, CatalogEntry>(&sql)
            .bind(source_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    #[tracing::instrument(skip(self), fields(db.table = "merged_videos", db.record_id = %id))]
    async fn set_visibility(
        &self,
        id: Uuid,
        owner_id: &str,
        is_public: bool,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        let sql = format!(
            r#"
            UPDATE merged_videos
            SET is_public = $3
            WHERE id = $1 AND owner_id = $2
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );
        let entry = sqlx::query_as::<Postgres, CatalogEntry>(&sql)
            .bind(id)
            .bind(owner_id)
            .bind(is_public)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    #[tracing::instrument(skip(self), fields(db.table = "merged_videos", db.record_id = %id))]
    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool, CatalogError> {
        let result = sqlx::query("DELETE FROM merged_videos WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "merged_videos"))]
    async fn list_public(&self, limit: i64, offset: i64) -> Result<Vec<CatalogEntry>, CatalogError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM merged_videos
            WHERE is_public
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<Postgres, CatalogEntry>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    #[tracing::instrument(skip(self), fields(db.table = "merged_videos"))]
    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM merged_videos
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<Postgres, CatalogEntry>(&sql)
            .bind(owner_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }
}
