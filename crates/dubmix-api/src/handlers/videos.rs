//! Catalog endpoints: listings, lookup, short-link resolution, visibility and delete.

use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use dubmix_core::constants::OWNER_HEADER;
use dubmix_core::{AppError, CatalogEntryResponse};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Owner id sent by the caller in the `x-owner-id` header.
#[derive(Debug, Clone)]
pub struct OwnerId(pub String);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| OwnerId(value.to_string()))
            .ok_or_else(|| {
                HttpAppError(AppError::Unauthorized(format!(
                    "Missing {} header",
                    OWNER_HEADER
                )))
            })
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    pub is_public: bool,
}

fn to_responses(entries: Vec<dubmix_core::CatalogEntry>) -> Vec<CatalogEntryResponse> {
    entries.into_iter().map(CatalogEntryResponse::from).collect()
}

#[tracing::instrument(skip(state))]
pub async fn list_public_videos(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let entries = state
        .orchestrator
        .catalog()
        .list_public(page.limit(), page.offset())
        .await?;
    Ok(Json(to_responses(entries)))
}

#[tracing::instrument(skip(state))]
pub async fn list_owner_videos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let owner = query
        .owner
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .ok_or_else(|| AppError::InvalidInput("owner query parameter is required".to_string()))?;

    let entries = state
        .orchestrator
        .catalog()
        .list_for_owner(
            owner,
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(to_responses(entries)))
}

#[tracing::instrument(skip(state), fields(entry_id = %id))]
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let entry = state.orchestrator.catalog().get(id).await?;
    Ok(Json(CatalogEntryResponse::from(entry)))
}

/// `/v/{id}`: short id first, then entry id.
#[tracing::instrument(skip(state))]
pub async fn resolve_short_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let entry = state.orchestrator.catalog().resolve(&id).await?;
    Ok(Json(CatalogEntryResponse::from(entry)))
}

#[tracing::instrument(skip(state, owner, body), fields(entry_id = %id, owner_id = %owner.0))]
pub async fn set_visibility(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    owner: OwnerId,
    ValidatedJson(body): ValidatedJson<VisibilityRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let entry = state
        .orchestrator
        .catalog()
        .set_visibility(id, &owner.0, body.is_public)
        .await?;
    tracing::info!(is_public = entry.is_public, "Visibility updated");
    Ok(Json(CatalogEntryResponse::from(entry)))
}

/// Removes the stored video and thumbnail, then the entry. A storage failure keeps the
/// entry so the delete can be retried.
#[tracing::instrument(skip(state, owner), fields(entry_id = %id, owner_id = %owner.0))]
pub async fn delete_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    owner: OwnerId,
) -> Result<impl IntoResponse, HttpAppError> {
    state.orchestrator.catalog().delete_entry(id, &owner.0).await?;
    Ok(StatusCode::NO_CONTENT)
}
