use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
    pub engine: String,
}

/// Liveness plus dependency status. Database and engine failures make the service
/// unhealthy; storage problems only degrade it.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut response = HealthCheckResponse {
        status: "healthy".to_string(),
        database: "not_configured".to_string(),
        storage: "unknown".to_string(),
        engine: "unknown".to_string(),
    };
    let mut overall_healthy = true;

    if let Some(ref pool) = state.db_pool {
        match tokio::time::timeout(CHECK_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
            Ok(Ok(_)) => response.database = "healthy".to_string(),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Database health check failed");
                response.database = "unhealthy".to_string();
                overall_healthy = false;
            }
            Err(_) => {
                tracing::error!("Database health check timed out");
                response.database = "timeout".to_string();
                overall_healthy = false;
            }
        }
    }

    // Lightweight exists check on a key that is never written
    match tokio::time::timeout(CHECK_TIMEOUT, state.storage.exists("health-check/probe")).await {
        Ok(Ok(_)) => response.storage = "healthy".to_string(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Storage health check warning");
            response.storage = "degraded".to_string();
        }
        Err(_) => {
            tracing::warn!("Storage health check timed out");
            response.storage = "timeout".to_string();
        }
    }

    match state.orchestrator.engine().ensure_ready().await {
        Ok(()) => response.engine = "healthy".to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Mux engine health check failed");
            response.engine = "unavailable".to_string();
            overall_healthy = false;
        }
    }

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        response.status = "unhealthy".to_string();
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}
