use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    decision_outcome, tally_approvals, tally_processing, Repository, RepositoryError,
    RepositoryResult, SUPERSEDED_FEEDBACK,
};
use crate::models::{
    ApprovalEntry, ApprovalStats, ApprovalStatus, ClearedCounts, CompletedRun, EnqueueSummary,
    ProcessedDocument, ProcessingStats, ProcessingStatus, QueueCounts, QueueItem, QueueStatus,
    UserAccount,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, UserAccount>,
    queue: Vec<QueueItem>,
    processed: Vec<ProcessedDocument>,
    approvals: Vec<ApprovalEntry>,
}

impl MemoryState {
    fn active_item(&self, user_id: Uuid, document_id: i64) -> Option<&QueueItem> {
        self.queue.iter().find(|item| {
            item.user_id == user_id
                && item.paperless_document_id == document_id
                && item.status.is_active()
        })
    }

    fn item_mut(&mut self, item_id: Uuid) -> RepositoryResult<&mut QueueItem> {
        self.queue
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("queue item {item_id}")))
    }

    fn push_item(&mut self, user_id: Uuid, document_id: i64, priority: i32) -> QueueItem {
        let item = QueueItem::new(user_id, document_id, priority);
        self.queue.push(item.clone());
        item
    }

    fn clear_finished(&mut self, user_id: Uuid) -> ClearedCounts {
        let mut cleared = ClearedCounts::default();
        self.queue.retain(|item| {
            if item.user_id != user_id {
                return true;
            }
            match item.status {
                QueueStatus::Completed => cleared.completed += 1,
                QueueStatus::Failed => cleared.failed += 1,
                _ => return true,
            }
            false
        });
        cleared.total = cleared.completed + cleared.failed;
        cleared
    }

    fn requeue(item: &mut QueueItem) {
        item.status = QueueStatus::Queued;
        item.started_at = None;
        item.completed_at = None;
    }
}

/// Process-local repository used when no database is configured.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserAccount) {
        self.state.lock().await.users.insert(user.id, user);
    }

    /// Snapshot of every queue row, in insertion order.
    pub async fn queue_items(&self) -> Vec<QueueItem> {
        self.state.lock().await.queue.clone()
    }

    /// Inserts a row as-is; lets callers seed items in any state.
    pub async fn insert_queue_item(&self, item: QueueItem) {
        self.state.lock().await.queue.push(item);
    }

    pub async fn insert_processed(&self, document: ProcessedDocument) {
        self.state.lock().await.processed.push(document);
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user(&self, user_id: Uuid) -> RepositoryResult<Option<UserAccount>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn active_users(&self) -> RepositoryResult<Vec<UserAccount>> {
        let state = self.state.lock().await;
        let mut users: Vec<UserAccount> = state
            .users
            .values()
            .filter(|user| user.is_active)
            .cloned()
            .collect();
        users.sort_by_key(|user| user.created_at);
        Ok(users)
    }

    async fn enqueue(
        &self,
        user_id: Uuid,
        document_id: i64,
        priority: i32,
    ) -> RepositoryResult<QueueItem> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.active_item(user_id, document_id) {
            return Ok(existing.clone());
        }
        Ok(state.push_item(user_id, document_id, priority))
    }

    async fn enqueue_with_reset(
        &self,
        user_id: Uuid,
        document_ids: &[i64],
        priority: i32,
    ) -> RepositoryResult<EnqueueSummary> {
        let mut state = self.state.lock().await;
        let mut summary = EnqueueSummary::default();

        let idle = !state
            .queue
            .iter()
            .any(|item| item.user_id == user_id && item.status.is_active());
        if idle {
            summary.cleared = state.clear_finished(user_id);
            summary.queue_was_reset = true;
        }

        for &document_id in document_ids {
            if state.active_item(user_id, document_id).is_some() {
                summary.already_queued += 1;
            } else {
                state.push_item(user_id, document_id, priority);
                summary.added += 1;
            }
        }
        Ok(summary)
    }

    async fn next_queued(&self, user_id: Option<Uuid>) -> RepositoryResult<Option<QueueItem>> {
        let state = self.state.lock().await;
        let mut best: Option<&QueueItem> = None;
        for item in state.queue.iter().filter(|item| {
            item.status == QueueStatus::Queued && user_id.map_or(true, |id| item.user_id == id)
        }) {
            best = match best {
                Some(current)
                    if current.priority > item.priority
                        || (current.priority == item.priority
                            && current.queued_at <= item.queued_at) =>
                {
                    Some(current)
                }
                _ => Some(item),
            };
        }
        Ok(best.cloned())
    }

    async fn mark_processing(&self, item_id: Uuid) -> RepositoryResult<Option<QueueItem>> {
        let mut state = self.state.lock().await;
        let item = state.item_mut(item_id)?;
        if item.status != QueueStatus::Queued {
            return Ok(None);
        }
        item.status = QueueStatus::Processing;
        item.started_at = Some(Utc::now());
        Ok(Some(item.clone()))
    }

    async fn mark_failed(&self, item_id: Uuid, error: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        let item = state.item_mut(item_id)?;
        item.status = QueueStatus::Failed;
        item.last_error = Some(error.to_string());
        item.retry_count += 1;
        item.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn complete_item(
        &self,
        item_id: Uuid,
        run: CompletedRun,
    ) -> RepositoryResult<ProcessedDocument> {
        let mut state = self.state.lock().await;
        state.item_mut(item_id)?;

        let now = Utc::now();
        let existing = state.processed.iter_mut().find(|doc| {
            doc.user_id == run.user_id && doc.paperless_document_id == run.paperless_document_id
        });
        let record = match existing {
            Some(doc) => {
                doc.processed_at = now;
                doc.status = run.status;
                doc.confidence_score = Some(run.confidence_score);
                doc.original_data = Some(run.original_data);
                doc.suggested_data = Some(run.suggested_data);
                doc.applied_data = run.applied_data;
                doc.error_message = None;
                doc.processing_time_ms = Some(run.processing_time_ms);
                doc.reprocess_count += 1;
                doc.clone()
            }
            None => {
                let doc = ProcessedDocument {
                    id: Uuid::new_v4(),
                    user_id: run.user_id,
                    paperless_document_id: run.paperless_document_id,
                    processed_at: now,
                    status: run.status,
                    confidence_score: Some(run.confidence_score),
                    original_data: Some(run.original_data),
                    suggested_data: Some(run.suggested_data),
                    applied_data: run.applied_data,
                    error_message: None,
                    processing_time_ms: Some(run.processing_time_ms),
                    reprocess_count: 0,
                };
                state.processed.push(doc.clone());
                doc
            }
        };

        for entry in state.approvals.iter_mut().filter(|entry| {
            entry.document_id == record.id && entry.status == ApprovalStatus::Pending
        }) {
            entry.status = ApprovalStatus::Rejected;
            entry.approved_at = Some(now);
            entry.feedback = Some(SUPERSEDED_FEEDBACK.to_string());
        }

        if let Some(suggestions) = run.approval_suggestions {
            state.approvals.push(ApprovalEntry {
                id: Uuid::new_v4(),
                document_id: record.id,
                user_id: run.user_id,
                suggestions,
                created_at: now,
                approved_at: None,
                feedback: None,
                status: ApprovalStatus::Pending,
            });
        }

        let item = state.item_mut(item_id)?;
        item.status = QueueStatus::Completed;
        item.completed_at = Some(now);
        item.last_error = None;
        Ok(record)
    }

    async fn retry_item(&self, item_id: Uuid) -> RepositoryResult<bool> {
        let mut state = self.state.lock().await;
        let (user_id, document_id, status) = {
            let item = state.item_mut(item_id)?;
            (item.user_id, item.paperless_document_id, item.status)
        };
        if status != QueueStatus::Failed || state.active_item(user_id, document_id).is_some() {
            return Ok(false);
        }
        MemoryState::requeue(state.item_mut(item_id)?);
        Ok(true)
    }

    async fn retry_failed(
        &self,
        max_retries: i32,
        user_id: Option<Uuid>,
    ) -> RepositoryResult<u64> {
        let mut state = self.state.lock().await;
        let candidates: Vec<(Uuid, Uuid, i64)> = state
            .queue
            .iter()
            .filter(|item| {
                item.status == QueueStatus::Failed
                    && item.retry_count < max_retries
                    && user_id.map_or(true, |id| item.user_id == id)
            })
            .map(|item| (item.id, item.user_id, item.paperless_document_id))
            .collect();

        let mut requeued = 0;
        for (item_id, owner, document_id) in candidates {
            if state.active_item(owner, document_id).is_some() {
                continue;
            }
            MemoryState::requeue(state.item_mut(item_id)?);
            requeued += 1;
        }
        Ok(requeued)
    }

    async fn queue_counts(&self, user_id: Option<Uuid>) -> RepositoryResult<QueueCounts> {
        let state = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for item in state
            .queue
            .iter()
            .filter(|item| user_id.map_or(true, |id| item.user_id == id))
        {
            counts.record(item.status);
        }
        Ok(counts)
    }

    async fn is_queue_empty(&self, user_id: Uuid) -> RepositoryResult<bool> {
        let state = self.state.lock().await;
        Ok(!state
            .queue
            .iter()
            .any(|item| item.user_id == user_id && item.status.is_active()))
    }

    async fn clear_completed_and_failed(&self, user_id: Uuid) -> RepositoryResult<ClearedCounts> {
        Ok(self.state.lock().await.clear_finished(user_id))
    }

    async fn clear_completed_older_than(
        &self,
        cutoff: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> RepositoryResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.queue.len();
        state.queue.retain(|item| {
            !(item.status == QueueStatus::Completed
                && item.completed_at.map_or(false, |at| at < cutoff)
                && user_id.map_or(true, |id| item.user_id == id))
        });
        Ok((before - state.queue.len()) as u64)
    }

    async fn list_queue(
        &self,
        user_id: Uuid,
        status: Option<QueueStatus>,
        limit: i64,
    ) -> RepositoryResult<Vec<QueueItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<QueueItem> = state
            .queue
            .iter()
            .filter(|item| item.user_id == user_id && status.map_or(true, |s| item.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn get_processed(
        &self,
        user_id: Uuid,
        document_id: i64,
    ) -> RepositoryResult<Option<ProcessedDocument>> {
        let state = self.state.lock().await;
        Ok(state
            .processed
            .iter()
            .find(|doc| doc.user_id == user_id && doc.paperless_document_id == document_id)
            .cloned())
    }

    async fn get_processed_by_id(
        &self,
        record_id: Uuid,
    ) -> RepositoryResult<Option<ProcessedDocument>> {
        let state = self.state.lock().await;
        Ok(state.processed.iter().find(|doc| doc.id == record_id).cloned())
    }

    async fn list_processed(
        &self,
        user_id: Uuid,
        status: Option<ProcessingStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<ProcessedDocument>> {
        let state = self.state.lock().await;
        let mut docs: Vec<ProcessedDocument> = state
            .processed
            .iter()
            .filter(|doc| doc.user_id == user_id && status.map_or(true, |s| doc.status == s))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(docs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn processing_stats(&self, user_id: Uuid) -> RepositoryResult<ProcessingStats> {
        let state = self.state.lock().await;
        Ok(tally_processing(
            state
                .processed
                .iter()
                .filter(|doc| doc.user_id == user_id)
                .map(|doc| doc.status),
        ))
    }

    async fn processed_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ProcessedDocument>> {
        let state = self.state.lock().await;
        let mut docs: Vec<ProcessedDocument> = state
            .processed
            .iter()
            .filter(|doc| doc.user_id == user_id && doc.processed_at >= from && doc.processed_at < to)
            .cloned()
            .collect();
        docs.sort_by_key(|doc| doc.processed_at);
        Ok(docs)
    }

    async fn list_approvals(
        &self,
        user_id: Uuid,
        status: Option<ApprovalStatus>,
    ) -> RepositoryResult<Vec<ApprovalEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<ApprovalEntry> = state
            .approvals
            .iter()
            .filter(|entry| {
                entry.user_id == user_id && status.map_or(true, |s| entry.status == s)
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn get_approval(&self, approval_id: Uuid) -> RepositoryResult<Option<ApprovalEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .approvals
            .iter()
            .find(|entry| entry.id == approval_id)
            .cloned())
    }

    async fn resolve_approval(
        &self,
        approval_id: Uuid,
        decision: ApprovalStatus,
        feedback: Option<String>,
        applied: Option<Value>,
    ) -> RepositoryResult<Option<ApprovalEntry>> {
        let outcome = decision_outcome(decision)?;
        let mut state = self.state.lock().await;

        let Some(entry) = state
            .approvals
            .iter_mut()
            .find(|entry| entry.id == approval_id)
        else {
            return Ok(None);
        };
        if entry.status != ApprovalStatus::Pending {
            return Err(RepositoryError::Conflict(format!(
                "approval {approval_id} is already {}",
                entry.status
            )));
        }
        entry.status = decision;
        entry.approved_at = Some(Utc::now());
        entry.feedback = feedback;
        let resolved = entry.clone();

        if let Some(doc) = state
            .processed
            .iter_mut()
            .find(|doc| doc.id == resolved.document_id)
        {
            doc.status = outcome;
            if applied.is_some() {
                doc.applied_data = applied;
            }
        }
        Ok(Some(resolved))
    }

    async fn approval_stats(&self, user_id: Uuid) -> RepositoryResult<ApprovalStats> {
        let state = self.state.lock().await;
        Ok(tally_approvals(
            state
                .approvals
                .iter()
                .filter(|entry| entry.user_id == user_id)
                .map(|entry| entry.status),
        ))
    }
}
