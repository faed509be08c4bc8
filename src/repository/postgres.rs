use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use tokio::task;
use uuid::Uuid;

use super::{
    decision_outcome, tally_approvals, tally_processing, Repository, RepositoryError,
    RepositoryResult, SUPERSEDED_FEEDBACK,
};
use crate::db::PgPool;
use crate::models::{
    ApprovalEntry, ApprovalStats, ApprovalStatus, ClearedCounts, CompletedRun, EnqueueSummary,
    ProcessedDocument, ProcessingStats, ProcessingStatus, QueueCounts, QueueItem, QueueStatus,
    UserAccount,
};
use crate::schema::{approval_queue, processed_documents, processing_queue, users};

const ACTIVE_STATUSES: [&str; 2] = ["queued", "processing"];

#[derive(Queryable)]
struct UserRow {
    id: Uuid,
    username: String,
    paperless_url: String,
    paperless_token: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            paperless_url: row.paperless_url,
            paperless_token: row.paperless_token,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable)]
struct QueueRow {
    id: Uuid,
    user_id: Uuid,
    paperless_document_id: i64,
    priority: i32,
    status: String,
    queued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    last_error: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = processing_queue)]
struct NewQueueRow<'a> {
    id: Uuid,
    user_id: Uuid,
    paperless_document_id: i64,
    priority: i32,
    status: &'a str,
    queued_at: DateTime<Utc>,
}

#[derive(Queryable)]
struct ProcessedRow {
    id: Uuid,
    user_id: Uuid,
    paperless_document_id: i64,
    processed_at: DateTime<Utc>,
    status: String,
    confidence_score: Option<f64>,
    original_data: Option<Value>,
    suggested_data: Option<Value>,
    applied_data: Option<Value>,
    error_message: Option<String>,
    processing_time_ms: Option<i64>,
    reprocess_count: i32,
}

#[derive(Insertable)]
#[diesel(table_name = processed_documents)]
struct NewProcessedRow<'a> {
    id: Uuid,
    user_id: Uuid,
    paperless_document_id: i64,
    processed_at: DateTime<Utc>,
    status: &'a str,
    confidence_score: Option<f64>,
    original_data: Option<&'a Value>,
    suggested_data: Option<&'a Value>,
    applied_data: Option<&'a Value>,
    processing_time_ms: Option<i64>,
    reprocess_count: i32,
}

#[derive(Queryable)]
struct ApprovalRow {
    id: Uuid,
    document_id: Uuid,
    user_id: Uuid,
    suggestions: Value,
    created_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    feedback: Option<String>,
    status: String,
}

#[derive(Insertable)]
#[diesel(table_name = approval_queue)]
struct NewApprovalRow<'a> {
    id: Uuid,
    document_id: Uuid,
    user_id: Uuid,
    suggestions: &'a Value,
    created_at: DateTime<Utc>,
    status: &'a str,
}

fn parse_status<T>(raw: &str) -> RepositoryResult<T>
where
    T: FromStr<Err = crate::models::ParseStatusError>,
{
    raw.parse()
        .map_err(|err: crate::models::ParseStatusError| RepositoryError::Corrupt(err.to_string()))
}

impl TryFrom<QueueRow> for QueueItem {
    type Error = RepositoryError;

    fn try_from(row: QueueRow) -> RepositoryResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            paperless_document_id: row.paperless_document_id,
            priority: row.priority,
            status: parse_status(&row.status)?,
            queued_at: row.queued_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            retry_count: row.retry_count,
            last_error: row.last_error,
        })
    }
}

impl TryFrom<ProcessedRow> for ProcessedDocument {
    type Error = RepositoryError;

    fn try_from(row: ProcessedRow) -> RepositoryResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            paperless_document_id: row.paperless_document_id,
            processed_at: row.processed_at,
            status: parse_status(&row.status)?,
            confidence_score: row.confidence_score,
            original_data: row.original_data,
            suggested_data: row.suggested_data,
            applied_data: row.applied_data,
            error_message: row.error_message,
            processing_time_ms: row.processing_time_ms,
            reprocess_count: row.reprocess_count,
        })
    }
}

impl TryFrom<ApprovalRow> for ApprovalEntry {
    type Error = RepositoryError;

    fn try_from(row: ApprovalRow) -> RepositoryResult<Self> {
        Ok(Self {
            id: row.id,
            document_id: row.document_id,
            user_id: row.user_id,
            suggestions: row.suggestions,
            created_at: row.created_at,
            approved_at: row.approved_at,
            feedback: row.feedback,
            status: parse_status(&row.status)?,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> RepositoryResult<Vec<T>>
where
    T: TryFrom<R, Error = RepositoryError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn find_active(
    conn: &mut PgConnection,
    user_id: Uuid,
    document_id: i64,
) -> QueryResult<Option<QueueRow>> {
    processing_queue::table
        .filter(processing_queue::user_id.eq(user_id))
        .filter(processing_queue::paperless_document_id.eq(document_id))
        .filter(processing_queue::status.eq_any(ACTIVE_STATUSES))
        .first::<QueueRow>(conn)
        .optional()
}

fn insert_queued(
    conn: &mut PgConnection,
    user_id: Uuid,
    document_id: i64,
    priority: i32,
) -> QueryResult<QueueRow> {
    diesel::insert_into(processing_queue::table)
        .values(&NewQueueRow {
            id: Uuid::new_v4(),
            user_id,
            paperless_document_id: document_id,
            priority,
            status: QueueStatus::Queued.as_str(),
            queued_at: Utc::now(),
        })
        .get_result(conn)
}

fn delete_finished(
    conn: &mut PgConnection,
    user_id: Uuid,
    status: QueueStatus,
) -> QueryResult<usize> {
    diesel::delete(
        processing_queue::table
            .filter(processing_queue::user_id.eq(user_id))
            .filter(processing_queue::status.eq(status.as_str())),
    )
    .execute(conn)
}

fn requeue(conn: &mut PgConnection, item_id: Uuid) -> QueryResult<usize> {
    diesel::update(
        processing_queue::table
            .find(item_id)
            .filter(processing_queue::status.eq(QueueStatus::Failed.as_str())),
    )
    .set((
        processing_queue::status.eq(QueueStatus::Queued.as_str()),
        processing_queue::started_at.eq::<Option<DateTime<Utc>>>(None),
        processing_queue::completed_at.eq::<Option<DateTime<Utc>>>(None),
    ))
    .execute(conn)
}

/// Diesel-backed repository; every call runs on the blocking pool.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds the pool and applies pending migrations.
    pub async fn connect(database_url: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        let pool = crate::db::init_pool_with_size(database_url, max_pool_size)?;
        let migration_pool = pool.clone();
        task::spawn_blocking(move || crate::db::run_migrations(&migration_pool)).await??;
        Ok(Self::new(pool))
    }

    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| RepositoryError::Pool(err.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| RepositoryError::Task(err.to_string()))?
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn get_user(&self, user_id: Uuid) -> RepositoryResult<Option<UserAccount>> {
        self.with_conn(move |conn| {
            let row = users::table
                .find(user_id)
                .first::<UserRow>(conn)
                .optional()?;
            Ok(row.map(UserAccount::from))
        })
        .await
    }

    async fn active_users(&self) -> RepositoryResult<Vec<UserAccount>> {
        self.with_conn(|conn| {
            let rows = users::table
                .filter(users::is_active.eq(true))
                .order(users::created_at.asc())
                .load::<UserRow>(conn)?;
            Ok(rows.into_iter().map(UserAccount::from).collect())
        })
        .await
    }

    async fn enqueue(
        &self,
        user_id: Uuid,
        document_id: i64,
        priority: i32,
    ) -> RepositoryResult<QueueItem> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let row = match find_active(conn, user_id, document_id)? {
                    Some(existing) => existing,
                    None => insert_queued(conn, user_id, document_id, priority)?,
                };
                QueueItem::try_from(row)
            })
        })
        .await
    }

    async fn enqueue_with_reset(
        &self,
        user_id: Uuid,
        document_ids: &[i64],
        priority: i32,
    ) -> RepositoryResult<EnqueueSummary> {
        let document_ids = document_ids.to_vec();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let mut summary = EnqueueSummary::default();
                let active: i64 = processing_queue::table
                    .filter(processing_queue::user_id.eq(user_id))
                    .filter(processing_queue::status.eq_any(ACTIVE_STATUSES))
                    .count()
                    .get_result(conn)?;

                if active == 0 {
                    let completed = delete_finished(conn, user_id, QueueStatus::Completed)? as u64;
                    let failed = delete_finished(conn, user_id, QueueStatus::Failed)? as u64;
                    summary.cleared = ClearedCounts {
                        completed,
                        failed,
                        total: completed + failed,
                    };
                    summary.queue_was_reset = true;
                }

                for document_id in document_ids {
                    if find_active(conn, user_id, document_id)?.is_some() {
                        summary.already_queued += 1;
                    } else {
                        insert_queued(conn, user_id, document_id, priority)?;
                        summary.added += 1;
                    }
                }
                Ok(summary)
            })
        })
        .await
    }

    async fn next_queued(&self, user_id: Option<Uuid>) -> RepositoryResult<Option<QueueItem>> {
        self.with_conn(move |conn| {
            let mut query = processing_queue::table
                .filter(processing_queue::status.eq(QueueStatus::Queued.as_str()))
                .into_boxed();
            if let Some(user_id) = user_id {
                query = query.filter(processing_queue::user_id.eq(user_id));
            }
            let row = query
                .order((
                    processing_queue::priority.desc(),
                    processing_queue::queued_at.asc(),
                ))
                .first::<QueueRow>(conn)
                .optional()?;
            row.map(QueueItem::try_from).transpose()
        })
        .await
    }

    async fn mark_processing(&self, item_id: Uuid) -> RepositoryResult<Option<QueueItem>> {
        self.with_conn(move |conn| {
            let row = diesel::update(
                processing_queue::table
                    .find(item_id)
                    .filter(processing_queue::status.eq(QueueStatus::Queued.as_str())),
            )
            .set((
                processing_queue::status.eq(QueueStatus::Processing.as_str()),
                processing_queue::started_at.eq(Some(Utc::now())),
            ))
            .get_result::<QueueRow>(conn)
            .optional()?;
            row.map(QueueItem::try_from).transpose()
        })
        .await
    }

    async fn mark_failed(&self, item_id: Uuid, error: &str) -> RepositoryResult<()> {
        let error = error.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(processing_queue::table.find(item_id))
                .set((
                    processing_queue::status.eq(QueueStatus::Failed.as_str()),
                    processing_queue::last_error.eq(Some(error)),
                    processing_queue::retry_count.eq(processing_queue::retry_count + 1),
                    processing_queue::completed_at.eq(Some(Utc::now())),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(RepositoryError::NotFound(format!("queue item {item_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn complete_item(
        &self,
        item_id: Uuid,
        run: CompletedRun,
    ) -> RepositoryResult<ProcessedDocument> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let now = Utc::now();
                processing_queue::table
                    .find(item_id)
                    .select(processing_queue::id)
                    .first::<Uuid>(conn)
                    .optional()?
                    .ok_or_else(|| RepositoryError::NotFound(format!("queue item {item_id}")))?;

                let existing = processed_documents::table
                    .filter(processed_documents::user_id.eq(run.user_id))
                    .filter(
                        processed_documents::paperless_document_id.eq(run.paperless_document_id),
                    )
                    .select(processed_documents::id)
                    .first::<Uuid>(conn)
                    .optional()?;

                let row: ProcessedRow = match existing {
                    Some(record_id) => diesel::update(processed_documents::table.find(record_id))
                        .set((
                            processed_documents::processed_at.eq(now),
                            processed_documents::status.eq(run.status.as_str()),
                            processed_documents::confidence_score.eq(Some(run.confidence_score)),
                            processed_documents::original_data.eq(Some(&run.original_data)),
                            processed_documents::suggested_data.eq(Some(&run.suggested_data)),
                            processed_documents::applied_data.eq(run.applied_data.as_ref()),
                            processed_documents::error_message.eq::<Option<String>>(None),
                            processed_documents::processing_time_ms
                                .eq(Some(run.processing_time_ms)),
                            processed_documents::reprocess_count
                                .eq(processed_documents::reprocess_count + 1),
                        ))
                        .get_result(conn)?,
                    None => diesel::insert_into(processed_documents::table)
                        .values(&NewProcessedRow {
                            id: Uuid::new_v4(),
                            user_id: run.user_id,
                            paperless_document_id: run.paperless_document_id,
                            processed_at: now,
                            status: run.status.as_str(),
                            confidence_score: Some(run.confidence_score),
                            original_data: Some(&run.original_data),
                            suggested_data: Some(&run.suggested_data),
                            applied_data: run.applied_data.as_ref(),
                            processing_time_ms: Some(run.processing_time_ms),
                            reprocess_count: 0,
                        })
                        .get_result(conn)?,
                };

                diesel::update(
                    approval_queue::table
                        .filter(approval_queue::document_id.eq(row.id))
                        .filter(approval_queue::status.eq(ApprovalStatus::Pending.as_str())),
                )
                .set((
                    approval_queue::status.eq(ApprovalStatus::Rejected.as_str()),
                    approval_queue::approved_at.eq(Some(now)),
                    approval_queue::feedback.eq(Some(SUPERSEDED_FEEDBACK)),
                ))
                .execute(conn)?;

                if let Some(suggestions) = &run.approval_suggestions {
                    diesel::insert_into(approval_queue::table)
                        .values(&NewApprovalRow {
                            id: Uuid::new_v4(),
                            document_id: row.id,
                            user_id: run.user_id,
                            suggestions,
                            created_at: now,
                            status: ApprovalStatus::Pending.as_str(),
                        })
                        .execute(conn)?;
                }

                diesel::update(processing_queue::table.find(item_id))
                    .set((
                        processing_queue::status.eq(QueueStatus::Completed.as_str()),
                        processing_queue::completed_at.eq(Some(now)),
                        processing_queue::last_error.eq::<Option<String>>(None),
                    ))
                    .execute(conn)?;

                ProcessedDocument::try_from(row)
            })
        })
        .await
    }

    async fn retry_item(&self, item_id: Uuid) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let Some(row) = processing_queue::table
                    .find(item_id)
                    .first::<QueueRow>(conn)
                    .optional()?
                else {
                    return Err(RepositoryError::NotFound(format!("queue item {item_id}")));
                };
                if find_active(conn, row.user_id, row.paperless_document_id)?.is_some() {
                    return Ok(false);
                }
                Ok(requeue(conn, item_id)? > 0)
            })
        })
        .await
    }

    async fn retry_failed(
        &self,
        max_retries: i32,
        user_id: Option<Uuid>,
    ) -> RepositoryResult<u64> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let mut query = processing_queue::table
                    .filter(processing_queue::status.eq(QueueStatus::Failed.as_str()))
                    .filter(processing_queue::retry_count.lt(max_retries))
                    .into_boxed();
                if let Some(user_id) = user_id {
                    query = query.filter(processing_queue::user_id.eq(user_id));
                }
                let candidates = query.load::<QueueRow>(conn)?;

                let mut requeued = 0;
                for row in candidates {
                    if find_active(conn, row.user_id, row.paperless_document_id)?.is_some() {
                        continue;
                    }
                    requeued += requeue(conn, row.id)? as u64;
                }
                Ok(requeued)
            })
        })
        .await
    }

    async fn queue_counts(&self, user_id: Option<Uuid>) -> RepositoryResult<QueueCounts> {
        self.with_conn(move |conn| {
            let mut query = processing_queue::table
                .select(processing_queue::status)
                .into_boxed();
            if let Some(user_id) = user_id {
                query = query.filter(processing_queue::user_id.eq(user_id));
            }
            let mut counts = QueueCounts::default();
            for raw in query.load::<String>(conn)? {
                counts.record(parse_status(&raw)?);
            }
            Ok(counts)
        })
        .await
    }

    async fn is_queue_empty(&self, user_id: Uuid) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            let active: i64 = processing_queue::table
                .filter(processing_queue::user_id.eq(user_id))
                .filter(processing_queue::status.eq_any(ACTIVE_STATUSES))
                .count()
                .get_result(conn)?;
            Ok(active == 0)
        })
        .await
    }

    async fn clear_completed_and_failed(&self, user_id: Uuid) -> RepositoryResult<ClearedCounts> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let completed = delete_finished(conn, user_id, QueueStatus::Completed)? as u64;
                let failed = delete_finished(conn, user_id, QueueStatus::Failed)? as u64;
                Ok(ClearedCounts {
                    completed,
                    failed,
                    total: completed + failed,
                })
            })
        })
        .await
    }

    async fn clear_completed_older_than(
        &self,
        cutoff: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> RepositoryResult<u64> {
        self.with_conn(move |conn| {
            let finished = processing_queue::table
                .filter(processing_queue::status.eq(QueueStatus::Completed.as_str()))
                .filter(processing_queue::completed_at.lt(cutoff));
            let deleted = match user_id {
                Some(user_id) => diesel::delete(
                    finished.filter(processing_queue::user_id.eq(user_id)),
                )
                .execute(conn)?,
                None => diesel::delete(finished).execute(conn)?,
            };
            Ok(deleted as u64)
        })
        .await
    }

    async fn list_queue(
        &self,
        user_id: Uuid,
        status: Option<QueueStatus>,
        limit: i64,
    ) -> RepositoryResult<Vec<QueueItem>> {
        self.with_conn(move |conn| {
            let mut query = processing_queue::table
                .filter(processing_queue::user_id.eq(user_id))
                .into_boxed();
            if let Some(status) = status {
                query = query.filter(processing_queue::status.eq(status.as_str()));
            }
            let rows = query
                .order(processing_queue::queued_at.desc())
                .limit(limit.max(0))
                .load::<QueueRow>(conn)?;
            convert_all(rows)
        })
        .await
    }

    async fn get_processed(
        &self,
        user_id: Uuid,
        document_id: i64,
    ) -> RepositoryResult<Option<ProcessedDocument>> {
        self.with_conn(move |conn| {
            let row = processed_documents::table
                .filter(processed_documents::user_id.eq(user_id))
                .filter(processed_documents::paperless_document_id.eq(document_id))
                .first::<ProcessedRow>(conn)
                .optional()?;
            row.map(ProcessedDocument::try_from).transpose()
        })
        .await
    }

    async fn get_processed_by_id(
        &self,
        record_id: Uuid,
    ) -> RepositoryResult<Option<ProcessedDocument>> {
        self.with_conn(move |conn| {
            let row = processed_documents::table
                .find(record_id)
                .first::<ProcessedRow>(conn)
                .optional()?;
            row.map(ProcessedDocument::try_from).transpose()
        })
        .await
    }

    async fn list_processed(
        &self,
        user_id: Uuid,
        status: Option<ProcessingStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<ProcessedDocument>> {
        self.with_conn(move |conn| {
            let mut query = processed_documents::table
                .filter(processed_documents::user_id.eq(user_id))
                .into_boxed();
            if let Some(status) = status {
                query = query.filter(processed_documents::status.eq(status.as_str()));
            }
            let rows = query
                .order(processed_documents::processed_at.desc())
                .limit(limit.max(0))
                .offset(offset.max(0))
                .load::<ProcessedRow>(conn)?;
            convert_all(rows)
        })
        .await
    }

    async fn processed_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ProcessedDocument>> {
        self.with_conn(move |conn| {
            let rows = processed_documents::table
                .filter(processed_documents::user_id.eq(user_id))
                .filter(processed_documents::processed_at.ge(from))
                .filter(processed_documents::processed_at.lt(to))
                .order(processed_documents::processed_at.asc())
                .load::<ProcessedRow>(conn)?;
            convert_all(rows)
        })
        .await
    }

    async fn processing_stats(&self, user_id: Uuid) -> RepositoryResult<ProcessingStats> {
        self.with_conn(move |conn| {
            let statuses = processed_documents::table
                .filter(processed_documents::user_id.eq(user_id))
                .select(processed_documents::status)
                .load::<String>(conn)?
                .iter()
                .map(|raw| parse_status::<ProcessingStatus>(raw))
                .collect::<RepositoryResult<Vec<_>>>()?;
            Ok(tally_processing(statuses))
        })
        .await
    }

    async fn list_approvals(
        &self,
        user_id: Uuid,
        status: Option<ApprovalStatus>,
    ) -> RepositoryResult<Vec<ApprovalEntry>> {
        self.with_conn(move |conn| {
            let mut query = approval_queue::table
                .filter(approval_queue::user_id.eq(user_id))
                .into_boxed();
            if let Some(status) = status {
                query = query.filter(approval_queue::status.eq(status.as_str()));
            }
            let rows = query
                .order(approval_queue::created_at.desc())
                .load::<ApprovalRow>(conn)?;
            convert_all(rows)
        })
        .await
    }

    async fn get_approval(&self, approval_id: Uuid) -> RepositoryResult<Option<ApprovalEntry>> {
        self.with_conn(move |conn| {
            let row = approval_queue::table
                .find(approval_id)
                .first::<ApprovalRow>(conn)
                .optional()?;
            row.map(ApprovalEntry::try_from).transpose()
        })
        .await
    }

    async fn resolve_approval(
        &self,
        approval_id: Uuid,
        decision: ApprovalStatus,
        feedback: Option<String>,
        applied: Option<Value>,
    ) -> RepositoryResult<Option<ApprovalEntry>> {
        let outcome = decision_outcome(decision)?;
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let Some(current) = approval_queue::table
                    .find(approval_id)
                    .first::<ApprovalRow>(conn)
                    .optional()?
                else {
                    return Ok(None);
                };
                if current.status != ApprovalStatus::Pending.as_str() {
                    return Err(RepositoryError::Conflict(format!(
                        "approval {approval_id} is already {}",
                        current.status
                    )));
                }

                let row: ApprovalRow = diesel::update(approval_queue::table.find(approval_id))
                    .set((
                        approval_queue::status.eq(decision.as_str()),
                        approval_queue::approved_at.eq(Some(Utc::now())),
                        approval_queue::feedback.eq(feedback),
                    ))
                    .get_result(conn)?;

                let target = processed_documents::table.find(row.document_id);
                match applied {
                    Some(applied) => diesel::update(target)
                        .set((
                            processed_documents::status.eq(outcome.as_str()),
                            processed_documents::applied_data.eq(Some(applied)),
                        ))
                        .execute(conn)?,
                    None => diesel::update(target)
                        .set(processed_documents::status.eq(outcome.as_str()))
                        .execute(conn)?,
                };

                ApprovalEntry::try_from(row).map(Some)
            })
        })
        .await
    }

    async fn approval_stats(&self, user_id: Uuid) -> RepositoryResult<ApprovalStats> {
        self.with_conn(move |conn| {
            let statuses = approval_queue::table
                .filter(approval_queue::user_id.eq(user_id))
                .select(approval_queue::status)
                .load::<String>(conn)?
                .iter()
                .map(|raw| parse_status::<ApprovalStatus>(raw))
                .collect::<RepositoryResult<Vec<_>>>()?;
            Ok(tally_approvals(statuses))
        })
        .await
    }
}
