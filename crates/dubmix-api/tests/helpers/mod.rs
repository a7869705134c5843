//! Test helpers: build the router over an in-memory catalog, a stub engine and a
//! local store in a temp dir. No Postgres or ffmpeg needed.

#![allow(dead_code)]

pub mod catalog;
pub mod engine;

use axum_test::TestServer;
use catalog::InMemoryCatalog;
use dubmix_api::handlers::merge::MergeResponse;
use dubmix_api::setup::routes;
use dubmix_api::state::AppState;
use dubmix_core::constants::{API_PREFIX, RECORDING_CREATED_CHANNEL};
use dubmix_core::{BaseConfig, Config, MergeServiceConfig, StorageBackend};
use dubmix_processing::{
    ArtifactPublisher, CatalogWriter, CompensationQueue, MergeOrchestrator, OrchestratorSettings,
    ResourceFetcher, ShortLinker,
};
use dubmix_storage::{LocalStorage, Storage};
use engine::StubEngine;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

pub const BASE_URL: &str = "http://localhost:4000/media";
pub const ANONYMOUS: &str = "anonymous";

/// API path prefix for tests (e.g. `/api/v0/videos`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

pub fn test_config(storage_path: &str) -> Config {
    Config(Box::new(MergeServiceConfig {
        base: BaseConfig {
            server_port: 0,
            cors_origins: vec!["*".to_string()],
            db_max_connections: 1,
            db_timeout_seconds: 1,
            environment: "test".to_string(),
            log_format: "text".to_string(),
            max_request_body_bytes: 1024 * 1024,
        },
        database_url: "postgresql://localhost/dubmix_test".to_string(),
        storage_backend: Some(StorageBackend::Local),
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        aws_region: None,
        local_storage_path: Some(storage_path.to_string()),
        local_storage_base_url: Some(BASE_URL.to_string()),
        firebase_storage_hosts: Vec::new(),
        ffmpeg_path: "ffmpeg".to_string(),
        ffprobe_path: "ffprobe".to_string(),
        mux_timeout_secs: 30,
        audio_bitrate_kbps: 128,
        scratch_dir: None,
        max_concurrent_merges: 2,
        publish_max_attempts: 2,
        catalog_max_attempts: 2,
        catalog_retry_base_ms: 0,
        short_url_base: Some("https://dub.example/v".to_string()),
        anonymous_owner_id: ANONYMOUS.to_string(),
        recording_trigger_enabled: false,
        recording_channel: RECORDING_CREATED_CHANNEL.to_string(),
    }))
}

pub struct TestApp {
    pub server: TestServer,
    pub storage: Arc<dyn Storage>,
    pub catalog: Arc<InMemoryCatalog>,
    _temp_dir: TempDir,
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with_engine(StubEngine::default()).await
}

pub async fn setup_test_app_with_engine(engine: StubEngine) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let store_path = temp_dir.path().join("store");
    let config = test_config(&store_path.to_string_lossy());

    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(store_path, BASE_URL.to_string())
            .await
            .expect("Failed to create local storage"),
    );
    let catalog = Arc::new(InMemoryCatalog::default());

    let (compensation, _) = CompensationQueue::start_with_backoff(storage.clone(), Duration::ZERO);
    let writer = CatalogWriter::new(
        catalog.clone(),
        storage.clone(),
        compensation,
        ShortLinker::new(config.short_url_base().map(String::from)),
        config.catalog_max_attempts(),
        Duration::ZERO,
    );
    let orchestrator = MergeOrchestrator::new(
        ResourceFetcher::new(storage.clone()),
        Arc::new(engine),
        ArtifactPublisher::new(storage.clone(), config.publish_max_attempts(), Duration::ZERO),
        writer,
        OrchestratorSettings {
            scratch_root: Some(temp_dir.path().join("scratch")),
            max_concurrent: 2,
        },
    );

    let state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        storage: storage.clone(),
        db_pool: None,
        anonymous_owner_id: ANONYMOUS.to_string(),
    });
    let router = routes::setup_routes(&config, state).expect("Failed to build routes");

    TestApp {
        server: TestServer::new(router).expect("Failed to start test server"),
        storage,
        catalog,
        _temp_dir: temp_dir,
    }
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Bytes of a stored object, read straight from the store directory.
    pub fn read_object(&self, key: &str) -> Vec<u8> {
        std::fs::read(self._temp_dir.path().join("store").join(key)).unwrap()
    }

    /// Store a clip and a voice-over under fresh keys and return their URLs.
    pub async fn seed_pair(&self) -> (String, String) {
        let id = Uuid::new_v4();
        let video = self
            .storage
            .upload_with_key(&format!("videos/{}.mp4", id), b"frames".to_vec(), "video/mp4")
            .await
            .unwrap();
        let audio = self
            .storage
            .upload_with_key(&format!("recordings/{}.webm", id), b"voice".to_vec(), "audio/webm")
            .await
            .unwrap();
        (video, audio)
    }

    /// Merge a fresh pair for `owner` through the endpoint.
    pub async fn create_video(&self, owner: &str) -> MergeResponse {
        let (video_url, audio_url) = self.seed_pair().await;
        let response = self
            .server
            .post("/merge")
            .json(&serde_json::json!({
                "videoUrl": video_url,
                "audioUrl": audio_url,
                "ownerId": owner,
            }))
            .await;
        assert_eq!(response.status_code(), 200, "merge failed: {}", response.text());
        response.json::<MergeResponse>()
    }
}

/// Strip the backend prefix from a URL issued by the test store.
pub fn key_of(url: &str) -> &str {
    url.strip_prefix(BASE_URL)
        .map(|k| k.trim_start_matches('/'))
        .unwrap_or(url)
}
