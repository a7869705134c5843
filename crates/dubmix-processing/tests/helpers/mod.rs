#![allow(dead_code)]

pub mod catalog;
pub mod engine;
pub mod storage;

use catalog::InMemoryCatalog;
use dubmix_core::SourcePair;
use dubmix_processing::{
    ArtifactPublisher, CatalogWriter, CompensationQueue, MergeOrchestrator, OrchestratorSettings,
    ResourceFetcher, ShortLinker,
};
use dubmix_storage::Storage;
use engine::FakeEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storage::FaultyStorage;
use tempfile::TempDir;

pub const OWNER: &str = "user-1";

/// A fully wired orchestrator over fakes and a temporary local store.
pub struct TestPipeline {
    pub orchestrator: MergeOrchestrator,
    pub storage: Arc<FaultyStorage>,
    pub catalog: Arc<InMemoryCatalog>,
    pub engine: Arc<FakeEngine>,
    pub scratch_root: PathBuf,
    _temp_dir: TempDir,
}

pub struct PipelineBuilder {
    engine: FakeEngine,
    catalog: InMemoryCatalog,
    fail_uploads_under: Option<String>,
    catalog_retry_base: Duration,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            engine: FakeEngine::new(),
            catalog: InMemoryCatalog::new(),
            fail_uploads_under: None,
            catalog_retry_base: Duration::ZERO,
        }
    }

    pub fn catalog_retry_base(mut self, base: Duration) -> Self {
        self.catalog_retry_base = base;
        self
    }

    pub fn engine(mut self, engine: FakeEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn catalog(mut self, catalog: InMemoryCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn failing_uploads_under(mut self, prefix: &str) -> Self {
        self.fail_uploads_under = Some(prefix.to_string());
        self
    }

    pub async fn build(self) -> TestPipeline {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let scratch_root = temp_dir.path().join("scratch");
        std::fs::create_dir_all(&scratch_root).unwrap();

        let mut faulty = FaultyStorage::new(&temp_dir.path().join("store")).await;
        if let Some(ref prefix) = self.fail_uploads_under {
            faulty = faulty.failing_uploads_under(prefix);
        }
        let storage = Arc::new(faulty);
        let shared: Arc<dyn Storage> = storage.clone();

        let catalog = Arc::new(self.catalog);
        let engine = Arc::new(self.engine);

        let (compensation, _handle) =
            CompensationQueue::start_with_backoff(shared.clone(), Duration::ZERO);
        let writer = CatalogWriter::new(
            catalog.clone(),
            shared.clone(),
            compensation,
            ShortLinker::new(Some("https://dub.example/v".to_string())),
            3,
            self.catalog_retry_base,
        );
        let orchestrator = MergeOrchestrator::new(
            ResourceFetcher::new(shared.clone()),
            engine.clone(),
            ArtifactPublisher::new(shared, 3, Duration::ZERO),
            writer,
            OrchestratorSettings {
                scratch_root: Some(scratch_root.clone()),
                max_concurrent: 2,
            },
        );

        TestPipeline {
            orchestrator,
            storage,
            catalog,
            engine,
            scratch_root,
            _temp_dir: temp_dir,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPipeline {
    pub async fn new() -> Self {
        PipelineBuilder::new().build().await
    }

    /// Store an input object and return the URL the backend issued for it.
    pub async fn seed(&self, key: &str, data: Vec<u8>) -> String {
        self.storage
            .upload_with_key(key, data, "application/octet-stream")
            .await
            .unwrap()
    }

    pub async fn seed_pair(&self, video: Vec<u8>, audio: Vec<u8>) -> SourcePair {
        let video_url = self.seed("videos/sample.mp4", video).await;
        let audio_url = self.seed("recordings/user-1/voice.webm", audio).await;
        SourcePair::new(video_url, audio_url, OWNER)
    }

    pub fn scratch_entries(&self) -> usize {
        scratch_entries(&self.scratch_root)
    }

    /// Wait for background compensation to empty `folder`.
    pub async fn wait_until_empty(&self, folder: &str) -> bool {
        for _ in 0..100 {
            if self.storage.count_objects(folder) == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

pub fn scratch_entries(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}
