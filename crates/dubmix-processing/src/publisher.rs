//! Upload merge artifacts under fresh owner-scoped keys.

use crate::error::PublishError;
use crate::retry::backoff_delay;
use dubmix_core::{MediaKind, PublishedArtifact};
use dubmix_storage::{artifact_key, Storage};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Fresh-key attempts before giving up on finding an unused name.
const MAX_KEY_COLLISIONS: u32 = 5;

#[derive(Clone)]
pub struct ArtifactPublisher {
    storage: Arc<dyn Storage>,
    max_attempts: u32,
    retry_base: Duration,
}

impl ArtifactPublisher {
    pub fn new(storage: Arc<dyn Storage>, max_attempts: u32, retry_base: Duration) -> Self {
        Self {
            storage,
            max_attempts: max_attempts.max(1),
            retry_base,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Upload `data` as a new object. Every attempt uses a new key, and a key that
    /// already exists is never overwritten.
    #[tracing::instrument(skip(self, data), fields(kind = ?kind, size_bytes = data.len()))]
    pub async fn publish(
        &self,
        data: Vec<u8>,
        kind: MediaKind,
        owner_id: &str,
    ) -> Result<PublishedArtifact, PublishError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.try_publish(&data, kind, owner_id).await {
                Ok(artifact) => {
                    tracing::info!(key = %artifact.key, attempt, "Artifact published");
                    return Ok(artifact);
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts = self.max_attempts, error = %e, "Publish attempt failed");
                    last_error = e;
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff_delay(self.retry_base, attempt)).await;
                    }
                }
            }
        }

        Err(PublishError::Exhausted {
            attempts: self.max_attempts,
            message: last_error,
        })
    }

    async fn try_publish(
        &self,
        data: &[u8],
        kind: MediaKind,
        owner_id: &str,
    ) -> Result<PublishedArtifact, String> {
        let key = self.unused_key(kind, owner_id).await?;
        let url = self
            .storage
            .upload_with_key(&key, data.to_vec(), kind.content_type())
            .await
            .map_err(|e| e.to_string())?;
        Ok(PublishedArtifact { key, url })
    }

    async fn unused_key(&self, kind: MediaKind, owner_id: &str) -> Result<String, String> {
        for _ in 0..MAX_KEY_COLLISIONS {
            let key = artifact_key(kind, owner_id, Uuid::new_v4());
            if !self.storage.exists(&key).await.map_err(|e| e.to_string())? {
                return Ok(key);
            }
            tracing::warn!(key = %key, "Generated key already in use");
        }
        Err("Could not find an unused storage key".to_string())
    }

    /// Remove a previously published artifact.
    pub async fn unpublish(&self, artifact: &PublishedArtifact) -> Result<(), PublishError> {
        self.storage
            .delete(&artifact.key)
            .await
            .map_err(|e| PublishError::Unpublish {
                key: artifact.key.clone(),
                message: e.to_string(),
            })
    }
}
