use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ApprovalEntry, ApprovalStats, ApprovalStatus, ClearedCounts, CompletedRun, EnqueueSummary,
    ProcessedDocument, ProcessingStats, ProcessingStatus, QueueCounts, QueueItem, QueueStatus,
    UserAccount,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("repository task failed: {0}")]
    Task(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

pub(crate) const SUPERSEDED_FEEDBACK: &str = "superseded by a newer run";

#[async_trait]
pub trait Repository: Send + Sync + 'static {
    async fn get_user(&self, user_id: Uuid) -> RepositoryResult<Option<UserAccount>>;

    async fn active_users(&self) -> RepositoryResult<Vec<UserAccount>>;

    async fn enqueue(
        &self,
        user_id: Uuid,
        document_id: i64,
        priority: i32,
    ) -> RepositoryResult<QueueItem>;

    /// Purges the user's finished rows first when nothing is queued or
    /// processing, then adds every document not already active.
    async fn enqueue_with_reset(
        &self,
        user_id: Uuid,
        document_ids: &[i64],
        priority: i32,
    ) -> RepositoryResult<EnqueueSummary>;

    /// Highest priority first, oldest first among equal priorities.
    async fn next_queued(&self, user_id: Option<Uuid>) -> RepositoryResult<Option<QueueItem>>;

    async fn mark_processing(&self, item_id: Uuid) -> RepositoryResult<Option<QueueItem>>;

    async fn mark_failed(&self, item_id: Uuid, error: &str) -> RepositoryResult<()>;

    async fn complete_item(
        &self,
        item_id: Uuid,
        run: CompletedRun,
    ) -> RepositoryResult<ProcessedDocument>;

    async fn retry_item(&self, item_id: Uuid) -> RepositoryResult<bool>;

    async fn retry_failed(&self, max_retries: i32, user_id: Option<Uuid>)
        -> RepositoryResult<u64>;

    async fn queue_counts(&self, user_id: Option<Uuid>) -> RepositoryResult<QueueCounts>;

    async fn is_queue_empty(&self, user_id: Uuid) -> RepositoryResult<bool>;

    async fn clear_completed_and_failed(&self, user_id: Uuid) -> RepositoryResult<ClearedCounts>;

    async fn clear_completed_older_than(
        &self,
        cutoff: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> RepositoryResult<u64>;

    async fn list_queue(
        &self,
        user_id: Uuid,
        status: Option<QueueStatus>,
        limit: i64,
    ) -> RepositoryResult<Vec<QueueItem>>;

    async fn get_processed(
        &self,
        user_id: Uuid,
        document_id: i64,
    ) -> RepositoryResult<Option<ProcessedDocument>>;

    async fn get_processed_by_id(
        &self,
        record_id: Uuid,
    ) -> RepositoryResult<Option<ProcessedDocument>>;

    async fn list_processed(
        &self,
        user_id: Uuid,
        status: Option<ProcessingStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<ProcessedDocument>>;

    async fn processing_stats(&self, user_id: Uuid) -> RepositoryResult<ProcessingStats>;

    async fn processed_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ProcessedDocument>>;

    async fn list_approvals(
        &self,
        user_id: Uuid,
        status: Option<ApprovalStatus>,
    ) -> RepositoryResult<Vec<ApprovalEntry>>;

    async fn get_approval(&self, approval_id: Uuid) -> RepositoryResult<Option<ApprovalEntry>>;

    /// Records a decision on a pending entry and moves the linked processed
    /// document to `Success` or `Rejected`.
    async fn resolve_approval(
        &self,
        approval_id: Uuid,
        decision: ApprovalStatus,
        feedback: Option<String>,
        applied: Option<Value>,
    ) -> RepositoryResult<Option<ApprovalEntry>>;

    async fn approval_stats(&self, user_id: Uuid) -> RepositoryResult<ApprovalStats>;
}

pub(crate) fn decision_outcome(decision: ApprovalStatus) -> RepositoryResult<ProcessingStatus> {
    match decision {
        ApprovalStatus::Approved => Ok(ProcessingStatus::Success),
        ApprovalStatus::Rejected => Ok(ProcessingStatus::Rejected),
        ApprovalStatus::Pending => Err(RepositoryError::Conflict(
            "an approval can only be resolved to approved or rejected".to_string(),
        )),
    }
}

pub(crate) fn tally_processing(statuses: impl IntoIterator<Item = ProcessingStatus>) -> ProcessingStats {
    let mut stats = ProcessingStats::default();
    for status in statuses {
        stats.total += 1;
        match status {
            ProcessingStatus::Success => stats.success += 1,
            ProcessingStatus::Failed => stats.failed += 1,
            ProcessingStatus::PendingApproval => stats.pending_approval += 1,
            ProcessingStatus::Rejected => stats.rejected += 1,
        }
    }
    stats.success_rate = crate::models::rate(stats.success, stats.total);
    stats
}

pub(crate) fn tally_approvals(statuses: impl IntoIterator<Item = ApprovalStatus>) -> ApprovalStats {
    let mut stats = ApprovalStats::default();
    for status in statuses {
        match status {
            ApprovalStatus::Pending => stats.pending += 1,
            ApprovalStatus::Approved => stats.approved += 1,
            ApprovalStatus::Rejected => stats.rejected += 1,
        }
    }
    stats.approval_rate = crate::models::rate(stats.approved, stats.approved + stats.rejected);
    stats
}
