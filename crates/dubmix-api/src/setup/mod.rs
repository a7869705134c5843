//! Application wiring: telemetry, database, storage, the merge pipeline and routes.

pub mod database;
pub mod engine;
pub mod routes;
pub mod server;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use dubmix_core::Config;
use dubmix_db::{CatalogRepository, RecordingRepository};
use dubmix_processing::{
    ArtifactPublisher, CatalogWriter, CompensationQueue, MergeOrchestrator, OrchestratorSettings,
    ResourceFetcher, ShortLinker,
};
use dubmix_worker::{RecordingEventAdapter, RecordingListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long shutdown waits for queued compensating deletes.
const COMPENSATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything `main` needs to serve and to shut down.
pub struct Application {
    pub state: Arc<AppState>,
    pub router: axum::Router,
    pub recording_listener: Option<RecordingListener>,
    /// Ends once every pipeline handle is dropped and the queue is empty.
    pub compensation_task: JoinHandle<()>,
}

pub async fn initialize_app(config: &Config) -> Result<Application> {
    crate::telemetry::init_telemetry(config.log_format())
        .context("Failed to initialize telemetry")?;

    tracing::info!(environment = %config.environment(), "Configuration loaded");

    let pool = database::setup_database(config).await?;
    let storage = storage::setup_storage(config).await?;
    let engine = engine::setup_engine(config).await?;

    let retry_base = Duration::from_millis(config.catalog_retry_base_ms());
    let (compensation, compensation_task) = CompensationQueue::start(storage.clone());
    let catalog = CatalogWriter::new(
        Arc::new(CatalogRepository::new(pool.clone())),
        storage.clone(),
        compensation,
        ShortLinker::new(config.short_url_base().map(String::from)),
        config.catalog_max_attempts(),
        retry_base,
    );

    let orchestrator = Arc::new(MergeOrchestrator::new(
        ResourceFetcher::new(storage.clone()).with_firebase_hosts(config.firebase_storage_hosts()),
        engine,
        ArtifactPublisher::new(storage.clone(), config.publish_max_attempts(), retry_base),
        catalog,
        OrchestratorSettings::from_config(config),
    ));

    let recording_listener = if config.recording_trigger_enabled() {
        Some(RecordingListener::start(
            pool.clone(),
            config.recording_channel().to_string(),
            Arc::new(RecordingRepository::new(pool.clone())),
            orchestrator.clone(),
            RecordingEventAdapter::new(config.anonymous_owner_id()),
        ))
    } else {
        tracing::info!("Recording trigger disabled");
        None
    };

    let state = Arc::new(AppState {
        orchestrator,
        storage,
        db_pool: Some(pool),
        anonymous_owner_id: config.anonymous_owner_id().to_string(),
    });

    let router = routes::setup_routes(config, state.clone())?;

    Ok(Application {
        state,
        router,
        recording_listener,
        compensation_task,
    })
}

/// Wait for the compensation queue to finish. Call after the server and triggers have
/// stopped and the application state is dropped, so the queue can close.
pub async fn drain_compensation(task: JoinHandle<()>) {
    match tokio::time::timeout(COMPENSATION_DRAIN_TIMEOUT, task).await {
        Ok(Ok(())) => tracing::info!("Compensation queue drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "Compensation task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = COMPENSATION_DRAIN_TIMEOUT.as_secs(),
            "Compensation queue still busy at shutdown; remaining deletes are dropped"
        ),
    }
}
