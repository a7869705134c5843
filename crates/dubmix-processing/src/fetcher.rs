//! Resolve merge inputs to local scratch files.

use crate::error::FetchError;
use crate::scratch::ScratchSpace;
use bytes::Bytes;
use dubmix_core::{MediaReference, TrackRole};
use dubmix_storage::{ReferenceParser, Storage, StorageError};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Where a track comes from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// A stored object, by key or by a URL one of our backends issued.
    Reference(MediaReference),
    /// Raw bytes handed over in-process.
    Inline { bytes: Bytes, extension: String },
}

impl MediaSource {
    pub fn extension(&self) -> &str {
        match self {
            MediaSource::Reference(r) => r.extension(),
            MediaSource::Inline { extension, .. } => extension,
        }
    }

    /// Mime type of the track: inferred by the reference, or from the extension of
    /// inline bytes.
    pub fn mime_type(&self, role: TrackRole) -> &str {
        match self {
            MediaSource::Reference(r) => r.mime_type(),
            MediaSource::Inline { extension, .. } => role.mime_for(extension),
        }
    }

    pub fn as_reference(&self) -> Option<&MediaReference> {
        match self {
            MediaSource::Reference(r) => Some(r),
            MediaSource::Inline { .. } => None,
        }
    }
}

/// A fetched track on local disk.
#[derive(Debug, Clone)]
pub struct LocalBuffer {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub extension: String,
    pub mime_type: String,
}

pub struct ResourceFetcher {
    storage: Arc<dyn Storage>,
    parser: ReferenceParser,
}

impl ResourceFetcher {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let parser = ReferenceParser::for_storage(storage.as_ref());
        Self { storage, parser }
    }

    /// Accept Firebase-style URLs from these hosts as well.
    pub fn with_firebase_hosts(mut self, hosts: &[String]) -> Self {
        self.parser = self.parser.with_firebase_hosts(hosts);
        self
    }

    /// Backend key for a reference.
    pub fn storage_key(&self, reference: &MediaReference) -> Result<String, FetchError> {
        self.parser
            .storage_key(reference.locator())
            .map_err(|e| FetchError::InvalidReference(e.to_string()))
    }

    #[tracing::instrument(skip(self, scratch, source), fields(role = role.as_str()))]
    pub async fn fetch(
        &self,
        scratch: &ScratchSpace,
        source: &MediaSource,
        role: TrackRole,
    ) -> Result<LocalBuffer, FetchError> {
        let path = scratch.input_path(role, source.extension());

        let written = match source {
            MediaSource::Inline { bytes, .. } => {
                if bytes.is_empty() {
                    return Err(FetchError::NotFound(format!("{} input is empty", role.as_str())));
                }
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|e| FetchError::NetworkError(e.to_string()))?;
                bytes.len() as u64
            }
            MediaSource::Reference(reference) => {
                let key = self.storage_key(reference)?;
                match self.stream_to_file(&key, &path).await {
                    Ok(n) => n,
                    Err(e) => {
                        scratch.remove_file(&path).await;
                        return Err(e);
                    }
                }
            }
        };

        if written == 0 {
            scratch.remove_file(&path).await;
            return Err(FetchError::NotFound(format!(
                "{} source is empty",
                role.as_str()
            )));
        }

        let mime_type = source.mime_type(role).to_string();
        tracing::debug!(
            path = %path.display(),
            size_bytes = written,
            mime_type = %mime_type,
            "Track fetched"
        );

        Ok(LocalBuffer {
            path,
            size_bytes: written,
            extension: source.extension().to_string(),
            mime_type,
        })
    }

    async fn stream_to_file(&self, key: &str, path: &Path) -> Result<u64, FetchError> {
        let mut stream = self
            .storage
            .download_stream(key)
            .await
            .map_err(map_storage_error)?;

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| FetchError::NetworkError(format!("Failed to create scratch file: {}", e)))?;

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_storage_error)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::NetworkError(e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        Ok(written)
    }
}

fn map_storage_error(err: StorageError) -> FetchError {
    match err {
        StorageError::NotFound(key) => FetchError::NotFound(key),
        StorageError::InvalidKey(msg) => FetchError::InvalidReference(msg),
        other => FetchError::NetworkError(other.to_string()),
    }
}
