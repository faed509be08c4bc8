use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::status_filter;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{ClearedCounts, EnqueueSummary, QueueItem, QueueStatus};
use crate::paperless::{DocumentQuery, DocumentService, MAX_PAGE_SIZE};
use crate::state::AppState;
use crate::workers::ManagerStats;

const DEFAULT_ITEM_LIMIT: i64 = 100;
const MAX_ITEM_LIMIT: i64 = 500;
const MAX_LISTING_PAGES: u32 = 500;

#[derive(Deserialize)]
pub struct QueueItemsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct ProcessNowRequest {
    pub document_ids: Option<Vec<i64>>,
    pub priority: Option<i32>,
}

#[derive(Serialize)]
pub struct ProcessNowResponse {
    pub requested: usize,
    #[serde(flatten)]
    pub summary: EnqueueSummary,
}

#[derive(Deserialize, Default)]
pub struct RetryFailedRequest {
    pub max_retries: Option<i32>,
}

pub async fn queue_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<ManagerStats>> {
    Ok(Json(state.manager.stats(Some(user.user_id)).await?))
}

pub async fn list_items(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<QueueItemsQuery>,
) -> AppResult<Json<Vec<QueueItem>>> {
    let status = status_filter::<QueueStatus>(query.status.as_deref())?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ITEM_LIMIT)
        .clamp(1, MAX_ITEM_LIMIT);
    let items = state.repo.list_queue(user.user_id, status, limit).await?;
    Ok(Json(items))
}

pub async fn pause(State(state): State<AppState>, user: AuthenticatedUser) -> Json<Value> {
    state.manager.pause();
    info!(user_id = %user.user_id, "queue paused via API");
    Json(json!({ "state": state.manager.state() }))
}

pub async fn resume(State(state): State<AppState>, user: AuthenticatedUser) -> Json<Value> {
    state.manager.resume();
    info!(user_id = %user.user_id, "queue resumed via API");
    Json(json!({ "state": state.manager.state() }))
}

pub async fn clear_finished(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<ClearedCounts>> {
    let cleared = state
        .manager
        .clear_completed_and_failed(user.user_id)
        .await?;
    Ok(Json(cleared))
}

/// Queues the given documents, or every document the caller can see in
/// the document service when no ids are supplied.
pub async fn process_now(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<ProcessNowRequest>>,
) -> AppResult<(StatusCode, Json<ProcessNowResponse>)> {
    let Json(payload) = payload.unwrap_or_default();
    let document_ids = match payload.document_ids {
        Some(ids) => {
            if ids.iter().any(|id| *id <= 0) {
                return Err(AppError::bad_request("document ids must be positive"));
            }
            ids
        }
        None => {
            let account = user.account(&state).await?;
            let service = state.clients.for_user(&account)?;
            list_all_document_ids(service.as_ref()).await?
        }
    };

    let summary = state
        .manager
        .add_documents_with_reset(user.user_id, &document_ids, payload.priority.unwrap_or(0))
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ProcessNowResponse {
            requested: document_ids.len(),
            summary,
        }),
    ))
}

pub async fn retry_failed(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<RetryFailedRequest>>,
) -> AppResult<Json<Value>> {
    let Json(payload) = payload.unwrap_or_default();
    let ceiling = payload
        .max_retries
        .unwrap_or(state.config.processing.retry_attempts as i32);
    if ceiling < 1 {
        return Err(AppError::bad_request("max_retries must be at least 1"));
    }
    let requeued = state
        .manager
        .retry_failed(ceiling, Some(user.user_id))
        .await?;
    Ok(Json(json!({ "requeued": requeued, "max_retries": ceiling })))
}

async fn list_all_document_ids(service: &dyn DocumentService) -> AppResult<Vec<i64>> {
    let mut ids = Vec::new();
    for page in 1..=MAX_LISTING_PAGES {
        let listing = service
            .list_documents(&DocumentQuery::page(page, MAX_PAGE_SIZE))
            .await?;
        ids.extend(listing.results.iter().map(|doc| doc.id));
        if listing.next.is_none() {
            break;
        }
    }
    Ok(ids)
}
