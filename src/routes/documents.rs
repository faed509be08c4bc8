use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::status_filter;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{
    ApprovalStats, ProcessedDocument, ProcessingStats, ProcessingStatus, QueueItem,
};
use crate::state::AppState;

pub const REPROCESS_PRIORITY: i32 = 10;
const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

#[derive(Deserialize)]
pub struct ListDocumentsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct DocumentStats {
    pub processing: ProcessingStats,
    pub approvals: ApprovalStats,
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListDocumentsQuery>,
) -> AppResult<Json<Vec<ProcessedDocument>>> {
    let status = status_filter::<ProcessingStatus>(query.status.as_deref())?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let documents = state
        .repo
        .list_processed(user.user_id, status, limit, offset)
        .await?;
    Ok(Json(documents))
}

pub async fn document_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentStats>> {
    let processing = state.repo.processing_stats(user.user_id).await?;
    let approvals = state.repo.approval_stats(user.user_id).await?;
    Ok(Json(DocumentStats {
        processing,
        approvals,
    }))
}

pub async fn reprocess_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(paperless_id): Path<i64>,
) -> AppResult<(StatusCode, Json<QueueItem>)> {
    if paperless_id <= 0 {
        return Err(AppError::bad_request("document id must be positive"));
    }
    let item = state
        .manager
        .add_document(user.user_id, paperless_id, REPROCESS_PRIORITY)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(item)))
}
