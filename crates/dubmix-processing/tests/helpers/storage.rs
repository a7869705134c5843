use async_trait::async_trait;
use dubmix_storage::{
    ByteStream, LocalStorage, Storage, StorageBackend, StorageError, StorageResult,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub const BASE_URL: &str = "http://localhost:3000/media";

/// Local storage with switchable faults.
pub struct FaultyStorage {
    inner: LocalStorage,
    base_path: PathBuf,
    /// Uploads whose key starts with this prefix fail.
    pub fail_uploads_under: Option<String>,
    pub fail_deletes: AtomicBool,
}

impl FaultyStorage {
    pub async fn new(base_path: &Path) -> Self {
        Self {
            inner: LocalStorage::new(base_path, BASE_URL.to_string())
                .await
                .unwrap(),
            base_path: base_path.to_path_buf(),
            fail_uploads_under: None,
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn failing_uploads_under(mut self, prefix: &str) -> Self {
        self.fail_uploads_under = Some(prefix.to_string());
        self
    }

    /// Bytes of a stored object, read straight from the store directory.
    pub fn read_object(&self, key: &str) -> Vec<u8> {
        std::fs::read(self.base_path.join(key)).unwrap()
    }

    /// Number of stored files below `folder`.
    pub fn count_objects(&self, folder: &str) -> usize {
        fn walk(dir: &Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .map(|e| {
                            let path = e.path();
                            if path.is_dir() {
                                walk(&path)
                            } else {
                                1
                            }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        walk(&self.base_path.join(folder))
    }
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        if let Some(ref prefix) = self.fail_uploads_under {
            if storage_key.starts_with(prefix.as_str()) {
                return Err(StorageError::UploadFailed("injected failure".to_string()));
            }
        }
        self.inner.upload_with_key(storage_key, data, content_type).await
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        self.inner.download_stream(storage_key).await
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::DeleteFailed("injected failure".to_string()));
        }
        self.inner.delete(storage_key).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    fn public_url_prefixes(&self) -> Vec<String> {
        self.inner.public_url_prefixes()
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
