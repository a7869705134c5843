use async_trait::async_trait;
use dubmix_core::constants::CATALOG_STATUS_READY;
use dubmix_core::{CatalogEntry, MergeResult};
use dubmix_db::{CatalogError, CatalogStore};
use std::sync::Mutex;
use uuid::Uuid;

/// Catalog kept in memory with the table's unique constraints.
#[derive(Default)]
pub struct InMemoryCatalog {
    entries: Mutex<Vec<CatalogEntry>>,
}

impl InMemoryCatalog {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn page(mut entries: Vec<CatalogEntry>, limit: i64, offset: i64) -> Vec<CatalogEntry> {
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn insert(&self, result: &MergeResult) -> Result<CatalogEntry, CatalogError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|e| e.source_key == result.source_key) {
            return Err(CatalogError::Duplicate {
                constraint: "merged_videos_source_key_unique".to_string(),
            });
        }
        if entries.iter().any(|e| e.short_id == result.short_id) {
            return Err(CatalogError::Duplicate {
                constraint: "merged_videos_short_id_key".to_string(),
            });
        }

        let entry = CatalogEntry {
            id: Uuid::new_v4(),
            short_id: result.short_id.clone(),
            short_url: result.short_url.clone(),
            owner_id: result.owner_id.clone(),
            video_url: result.merged_video.url.clone(),
            video_key: result.merged_video.key.clone(),
            thumbnail_url: result.thumbnail.as_ref().map(|t| t.url.clone()),
            thumbnail_key: result.thumbnail.as_ref().map(|t| t.key.clone()),
            source_video_id: result.source_video_id.clone(),
            source_key: result.source_key.clone(),
            is_public: result.is_public,
            status: CATALOG_STATUS_READY.to_string(),
            duration_secs: result.duration_secs,
            created_at: result.created_at,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn get(&self, id: Uuid) -> Result<Option<CatalogEntry>, CatalogError> {
        Ok(self.entries.lock().unwrap().iter().find(|e| e.id == id).cloned())
    }

    async fn find_by_short_id(&self, short_id: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().find(|e| e.short_id == short_id).cloned())
    }

    async fn find_by_source_key(&self, key: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().find(|e| e.source_key == key).cloned())
    }

    async fn set_visibility(
        &self,
        id: Uuid,
        owner_id: &str,
        is_public: bool,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        let mut entries = self.entries.lock().unwrap();
        Ok(entries
            .iter_mut()
            .find(|e| e.id == id && e.owner_id == owner_id)
            .map(|e| {
                e.is_public = is_public;
                e.clone()
            }))
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> Result<bool, CatalogError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !(e.id == id && e.owner_id == owner_id));
        Ok(entries.len() < before)
    }

    async fn list_public(&self, limit: i64, offset: i64) -> Result<Vec<CatalogEntry>, CatalogError> {
        let public = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_public)
            .cloned()
            .collect();
        Ok(Self::page(public, limit, offset))
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let owned = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(Self::page(owned, limit, offset))
    }
}
