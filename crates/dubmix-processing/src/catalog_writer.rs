//! Catalog operations that span the database and object storage.

use crate::compensation::CompensationQueue;
use crate::retry::backoff_delay;
use crate::short_link::ShortLinker;
use dubmix_core::{AppError, CatalogEntry, MergeResult};
use dubmix_db::{CatalogError, CatalogStore};
use dubmix_storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Largest page a listing may request.
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct CatalogWriter {
    catalog: Arc<dyn CatalogStore>,
    storage: Arc<dyn Storage>,
    compensation: CompensationQueue,
    linker: ShortLinker,
    max_attempts: u32,
    retry_base: Duration,
}

impl CatalogWriter {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        storage: Arc<dyn Storage>,
        compensation: CompensationQueue,
        linker: ShortLinker,
        max_attempts: u32,
        retry_base: Duration,
    ) -> Self {
        Self {
            catalog,
            storage,
            compensation,
            linker,
            max_attempts: max_attempts.max(1),
            retry_base,
        }
    }

    pub fn issue_short_link(&self) -> (String, Option<String>) {
        self.linker.issue()
    }

    /// Insert the result of a merge.
    ///
    /// Transient failures are retried with the same artifact references. A short id
    /// collision gets a new short id. When the write finally fails, the uploaded objects
    /// are handed to the compensation queue.
    #[tracing::instrument(skip(self, result), fields(owner_id = %result.owner_id, key = %result.merged_video.key))]
    pub async fn record_merge(&self, mut result: MergeResult) -> Result<CatalogEntry, CatalogError> {
        let mut attempt = 1;
        loop {
            let err = match self.catalog.insert(&result).await {
                Ok(entry) => {
                    tracing::info!(entry_id = %entry.id, attempt, "Merge recorded");
                    return Ok(entry);
                }
                Err(e) => e,
            };

            let short_id_taken =
                matches!(err, CatalogError::Duplicate { .. }) && !err.is_source_key_conflict();
            let retry = attempt < self.max_attempts && (err.is_transient() || short_id_taken);

            if !retry {
                return self.settle_failed_write(&result, attempt, err).await;
            }

            if short_id_taken {
                let (short_id, short_url) = self.linker.issue();
                result.short_id = short_id;
                result.short_url = short_url;
            } else {
                tokio::time::sleep(backoff_delay(self.retry_base, attempt)).await;
            }
            tracing::warn!(attempt, error = %err, "Retrying catalog write");
            attempt += 1;
        }
    }

    /// Final failure of `record_merge`. An earlier attempt may have committed even though
    /// its reply was lost, so the row for this source pair is read back before anything
    /// is deleted: a row that already points at these objects is the result.
    async fn settle_failed_write(
        &self,
        result: &MergeResult,
        attempt: u32,
        err: CatalogError,
    ) -> Result<CatalogEntry, CatalogError> {
        let mut keys = vec![result.merged_video.key.clone()];
        if let Some(ref thumb) = result.thumbnail {
            keys.push(thumb.key.clone());
        }

        match self.catalog.find_by_source_key(&result.source_key).await {
            Ok(Some(existing)) if existing.video_key == result.merged_video.key => {
                tracing::info!(
                    entry_id = %existing.id,
                    attempt,
                    "Merge was recorded by an earlier attempt"
                );
                Ok(existing)
            }
            Ok(_) => {
                tracing::error!(attempt, error = %err, "Catalog write failed");
                self.compensation.schedule(keys, err.to_string());
                Err(err)
            }
            Err(lookup) => {
                // Unknown whether a row references the uploads; keep them.
                tracing::error!(
                    attempt,
                    error = %err,
                    lookup_error = %lookup,
                    keys = ?keys,
                    "Catalog write failed and could not be verified; uploads kept"
                );
                Err(err)
            }
        }
    }

    /// Queue stored objects for background deletion.
    pub fn compensate(&self, keys: Vec<String>, reason: &str) {
        self.compensation.schedule(keys, reason);
    }

    pub async fn find_by_source_key(
        &self,
        source_key: &str,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        self.catalog.find_by_source_key(source_key).await
    }

    pub async fn get(&self, id: Uuid) -> Result<CatalogEntry, AppError> {
        self.catalog
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", id)))
    }

    /// Look up by short id first, then by entry id.
    pub async fn resolve(&self, id_or_short_id: &str) -> Result<CatalogEntry, AppError> {
        if let Some(entry) = self.catalog.find_by_short_id(id_or_short_id).await? {
            return Ok(entry);
        }
        if let Ok(id) = Uuid::parse_str(id_or_short_id) {
            if let Some(entry) = self.catalog.get(id).await? {
                return Ok(entry);
            }
        }
        Err(AppError::NotFound(format!(
            "Video {} not found",
            id_or_short_id
        )))
    }

    /// Change only the visibility flag. Entries of other owners are reported as missing.
    pub async fn set_visibility(
        &self,
        id: Uuid,
        owner_id: &str,
        is_public: bool,
    ) -> Result<CatalogEntry, AppError> {
        let entry = self
            .catalog
            .set_visibility(id, owner_id, is_public)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", id)))?;

        tracing::info!(entry_id = %id, is_public, "Visibility updated");
        Ok(entry)
    }

    /// Delete the stored objects, then the record. If any object cannot be deleted the
    /// record stays so the delete can be repeated.
    #[tracing::instrument(skip(self))]
    pub async fn delete_entry(&self, id: Uuid, owner_id: &str) -> Result<(), AppError> {
        let entry = match self.catalog.get(id).await? {
            Some(entry) if entry.owner_id == owner_id => entry,
            _ => return Err(AppError::NotFound(format!("Video {} not found", id))),
        };

        for key in entry.storage_keys() {
            self.storage.delete(key).await.map_err(|e| {
                tracing::error!(key = %key, error = %e, "Failed to delete stored artifact");
                AppError::Storage(format!("Failed to delete {}: {}", key, e))
            })?;
        }

        if !self.catalog.delete(id, owner_id).await? {
            return Err(AppError::NotFound(format!("Video {} not found", id)));
        }

        tracing::info!(entry_id = %id, "Video deleted");
        Ok(())
    }

    pub async fn list_public(&self, limit: i64, offset: i64) -> Result<Vec<CatalogEntry>, AppError> {
        let (limit, offset) = page(limit, offset);
        Ok(self.catalog.list_public(limit, offset).await?)
    }

    pub async fn list_for_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CatalogEntry>, AppError> {
        let (limit, offset) = page(limit, offset);
        Ok(self.catalog.list_by_owner(owner_id, limit, offset).await?)
    }
}

fn page(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_PAGE_SIZE), offset.max(0))
}
