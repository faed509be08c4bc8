use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::status_filter;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{ApprovalEntry, ApprovalStatus, ProcessedDocument};
use crate::pipeline::SuggestedMetadata;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListApprovalsQuery {
    pub status: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct RejectRequest {
    pub feedback: Option<String>,
}

pub async fn list_approvals(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListApprovalsQuery>,
) -> AppResult<Json<Vec<ApprovalEntry>>> {
    let status = status_filter::<ApprovalStatus>(query.status.as_deref())?;
    let entries = state.repo.list_approvals(user.user_id, status).await?;
    Ok(Json(entries))
}

pub async fn approve(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(approval_id): Path<Uuid>,
) -> AppResult<Json<ApprovalEntry>> {
    let (entry, record) = load_pending(&state, &user, approval_id).await?;
    let suggested: SuggestedMetadata = serde_json::from_value(entry.suggestions.clone())
        .map_err(|err| AppError::internal(format!("stored suggestions are unreadable: {err}")))?;

    let account = user.account(&state).await?;
    let service = state.clients.for_user(&account)?;
    let update = state
        .applier
        .approve(service.as_ref(), record.paperless_document_id, &suggested)
        .await?;

    let resolved = state
        .repo
        .resolve_approval(
            approval_id,
            ApprovalStatus::Approved,
            None,
            Some(serde_json::to_value(&update)?),
        )
        .await?
        .ok_or_else(AppError::not_found)?;
    info!(
        %approval_id,
        document_id = record.paperless_document_id,
        "approval accepted and applied"
    );
    Ok(Json(resolved))
}

pub async fn reject(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(approval_id): Path<Uuid>,
    payload: Option<Json<RejectRequest>>,
) -> AppResult<Json<ApprovalEntry>> {
    let Json(payload) = payload.unwrap_or_default();
    let (_, record) = load_pending(&state, &user, approval_id).await?;

    let account = user.account(&state).await?;
    let service = state.clients.for_user(&account)?;
    state
        .applier
        .reject(service.as_ref(), record.paperless_document_id)
        .await;

    let resolved = state
        .repo
        .resolve_approval(
            approval_id,
            ApprovalStatus::Rejected,
            payload.feedback,
            None,
        )
        .await?
        .ok_or_else(AppError::not_found)?;
    info!(
        %approval_id,
        document_id = record.paperless_document_id,
        "approval rejected"
    );
    Ok(Json(resolved))
}

/// Fetches a pending entry owned by `user` together with its processed record.
async fn load_pending(
    state: &AppState,
    user: &AuthenticatedUser,
    approval_id: Uuid,
) -> AppResult<(ApprovalEntry, ProcessedDocument)> {
    let entry = state
        .repo
        .get_approval(approval_id)
        .await?
        .filter(|entry| entry.user_id == user.user_id)
        .ok_or_else(AppError::not_found)?;
    if entry.status != ApprovalStatus::Pending {
        return Err(AppError::conflict(format!(
            "approval {approval_id} is already {}",
            entry.status
        )));
    }
    let record = state
        .repo
        .get_processed_by_id(entry.document_id)
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok((entry, record))
}
