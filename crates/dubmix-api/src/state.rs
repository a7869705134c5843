use dubmix_processing::MergeOrchestrator;
use dubmix_storage::Storage;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<MergeOrchestrator>,
    pub storage: Arc<dyn Storage>,
    /// Catalog pool, probed by the health check. Absent when the catalog is not
    /// Postgres backed (tests).
    pub db_pool: Option<PgPool>,
    pub anonymous_owner_id: String,
}
