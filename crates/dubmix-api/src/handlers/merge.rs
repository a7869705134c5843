//! `POST /merge`: merge a stored clip with a stored voice-over and publish the result.
//!
//! Success is `200 {mergedVideoUrl, thumbnailUrl?, id, shortUrl?}`. Every failure is a
//! `500` with a plain generic message; the reason only goes to the logs.

use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dubmix_core::SourcePair;
use dubmix_processing::{
    dispatch, JobControl, MergeFailure, MergeOutcome, MergeRequest, TriggerAdapter,
};
use dubmix_worker::merge_worker::GENERIC_ERROR;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequestBody {
    #[validate(length(min = 1, message = "videoUrl is required"))]
    pub video_url: String,
    #[validate(length(min = 1, message = "audioUrl is required"))]
    pub audio_url: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub source_video_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub merged_video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
}

pub struct HttpMergeAdapter {
    anonymous_owner_id: String,
}

impl HttpMergeAdapter {
    pub fn new(anonymous_owner_id: impl Into<String>) -> Self {
        Self {
            anonymous_owner_id: anonymous_owner_id.into(),
        }
    }
}

fn failure_response() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR).into_response()
}

impl TriggerAdapter for HttpMergeAdapter {
    type Input = MergeRequestBody;
    type Output = Response;

    fn parse_input(&self, body: MergeRequestBody) -> Result<MergeRequest, MergeFailure> {
        body.validate()
            .map_err(|e| MergeFailure::InvalidInput(e.to_string()))?;

        let owner = body
            .owner_id
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| self.anonymous_owner_id.clone());

        let mut pair = SourcePair::new(body.video_url, body.audio_url, owner);
        if let Some(source_video_id) = body.source_video_id {
            pair = pair.with_source_video_id(source_video_id);
        }
        Ok(MergeRequest::from_pair(pair))
    }

    fn emit_result(&self, outcome: MergeOutcome) -> Response {
        match outcome {
            MergeOutcome::Persisted(entry) => {
                tracing::info!(entry_id = %entry.id, short_id = %entry.short_id, "Merge request completed");
                let body = MergeResponse {
                    merged_video_url: entry.video_url,
                    thumbnail_url: entry.thumbnail_url,
                    id: entry.id,
                    short_url: entry.short_url,
                };
                (StatusCode::OK, Json(body)).into_response()
            }
            MergeOutcome::Delivered(_) => {
                tracing::error!("Merge request produced unpublished artifacts");
                failure_response()
            }
        }
    }

    fn emit_error(&self, failure: MergeFailure) -> Response {
        match &failure {
            MergeFailure::InvalidInput(_)
            | MergeFailure::AlreadyConsumed { .. }
            | MergeFailure::InFlight => {
                tracing::info!(reason = failure.reason_code(), error = %failure, "Merge request rejected");
            }
            _ => {
                tracing::error!(
                    reason = failure.reason_code(),
                    retryable = failure.is_retryable(),
                    error = %failure,
                    "Merge request failed"
                );
            }
        }
        failure_response()
    }
}

pub async fn merge(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MergeRequestBody>, JsonRejection>,
) -> Response {
    let adapter = HttpMergeAdapter::new(state.anonymous_owner_id.clone());
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return adapter.emit_error(MergeFailure::InvalidInput(rejection.body_text()));
        }
    };

    // A client that goes away before publishing drops the job with its scratch files and
    // engine child. After that the merge finishes on its own task.
    dispatch(&adapter, &state.orchestrator, body, JobControl::default()).await
}
