use async_trait::async_trait;
use dubmix_core::constants::CATALOG_STATUS_READY;
use dubmix_core::{CatalogEntry, MergeResult};
use dubmix_db::{CatalogError, CatalogStore};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Catalog kept in memory, enforcing the same unique constraints as the table.
#[derive(Default)]
pub struct InMemoryCatalog {
    entries: Mutex<Vec<CatalogEntry>>,
    /// Number of upcoming inserts that fail as if the database were unreachable.
    pub failing_inserts: AtomicU32,
    pub insert_calls: AtomicU32,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(count: u32) -> Self {
        let catalog = Self::default();
        catalog.failing_inserts.store(count, Ordering::SeqCst);
        catalog
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn insert(&self, result: &MergeResult) -> Result<CatalogEntry, CatalogError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_inserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_inserts.store(remaining - 1, Ordering::SeqCst);
            return Err(CatalogError::Unavailable("connection refused".to_string()));
        }

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
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.short_id == short_id)
            .cloned())
    }

    async fn find_by_source_key(
        &self,
        source_key: &str,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.source_key == source_key)
            .cloned())
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
        let mut public: Vec<CatalogEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_public)
            .cloned()
            .collect();
        public.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(public
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut owned: Vec<CatalogEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}
