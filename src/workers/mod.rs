use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::applier::{ApplyOutcome, MetadataApplier};
use crate::config::{ProcessingConfig, ProcessingMode};
use crate::models::{
    ClearedCounts, CompletedRun, EnqueueSummary, ProcessedDocument, ProcessingStatus, QueueCounts,
    QueueItem,
};
use crate::paperless::{DocumentServiceFactory, PaperlessError};
use crate::pipeline::{DocumentProcessor, ProcessingError, ProcessingResult};
use crate::repository::{Repository, RepositoryError};

pub mod batch;
pub mod poll;

use batch::{BatchTrigger, BATCH_TICK};
use poll::DocumentWatcher;

const PAUSED_BACKOFF: Duration = Duration::from_secs(1);
const IDLE_BACKOFF: Duration = Duration::from_secs(2);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
const TRIGGER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    #[error(transparent)]
    DocumentService(#[from] PaperlessError),
    #[error("failed to encode processing result: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("user {0} not found")]
    UnknownUser(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifetimeStats {
    pub total_processed: u64,
    pub total_success: u64,
    pub total_failed: u64,
    pub total_retries: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub is_running: bool,
    pub is_paused: bool,
    pub mode: &'static str,
    pub workers: usize,
    pub uptime_seconds: u64,
    pub queue: QueueCounts,
    pub lifetime: LifetimeStats,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LifetimeStats {
        LifetimeStats {
            total_processed: self.processed.load(Ordering::Relaxed),
            total_success: self.success.load(Ordering::Relaxed),
            total_failed: self.failed.load(Ordering::Relaxed),
            total_retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

struct RunningTasks {
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    trigger: Option<JoinHandle<()>>,
    started_at: Instant,
}

struct Inner {
    repo: Arc<dyn Repository>,
    processor: Arc<DocumentProcessor>,
    applier: Arc<MetadataApplier>,
    clients: Arc<dyn DocumentServiceFactory>,
    config: ProcessingConfig,
    running: AtomicBool,
    paused: AtomicBool,
    /// (user, document) pairs currently inside the pipeline.
    in_flight: Mutex<HashSet<(Uuid, i64)>>,
    counters: Counters,
    tasks: Mutex<Option<RunningTasks>>,
}

#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

impl QueueManager {
    pub fn new(
        repo: Arc<dyn Repository>,
        processor: Arc<DocumentProcessor>,
        applier: Arc<MetadataApplier>,
        clients: Arc<dyn DocumentServiceFactory>,
        config: ProcessingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                processor,
                applier,
                clients,
                config,
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                in_flight: Mutex::new(HashSet::new()),
                counters: Counters::default(),
                tasks: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ManagerState {
        match (self.is_running(), self.is_paused()) {
            (false, _) => ManagerState::Stopped,
            (true, true) => ManagerState::Paused,
            (true, false) => ManagerState::Running,
        }
    }

    pub async fn start(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        if tasks.is_some() {
            warn!("queue manager already running");
            return;
        }

        let config = &self.inner.config;
        let shutdown = CancellationToken::new();
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.running.store(true, Ordering::SeqCst);

        let workers = (0..config.concurrent_workers)
            .map(|worker_id| tokio::spawn(self.clone().worker_loop(worker_id, shutdown.clone())))
            .collect();
        let trigger = match config.mode {
            ProcessingMode::Realtime => Some(tokio::spawn(self.clone().poll_loop(shutdown.clone()))),
            ProcessingMode::Batch => Some(tokio::spawn(self.clone().batch_loop(shutdown.clone()))),
            ProcessingMode::Manual => None,
        };

        info!(
            mode = config.mode.as_str(),
            workers = config.concurrent_workers,
            "queue manager started"
        );
        *tasks = Some(RunningTasks {
            shutdown,
            workers,
            trigger,
            started_at: Instant::now(),
        });
    }

    /// Cancels the trigger task, lets workers finish their current item
    /// within the shutdown timeout, then aborts whatever is left.
    pub async fn stop(&self) {
        let Some(tasks) = self.inner.tasks.lock().await.take() else {
            debug!("queue manager not running");
            return;
        };
        info!("stopping queue manager");
        self.inner.running.store(false, Ordering::SeqCst);
        tasks.shutdown.cancel();

        if let Some(mut trigger) = tasks.trigger {
            if timeout(TRIGGER_GRACE, &mut trigger).await.is_err() {
                warn!("trigger task did not stop in time; aborting");
                trigger.abort();
            }
        }

        let mut workers = tasks.workers;
        let grace = self.inner.config.shutdown_timeout;
        if timeout(grace, join_all(workers.iter_mut())).await.is_err() {
            warn!(timeout_secs = grace.as_secs(), "workers did not stop in time; aborting");
            for worker in &workers {
                worker.abort();
            }
        }

        self.inner.in_flight.lock().await.clear();
        let lifetime = self.inner.counters.snapshot();
        info!(
            processed = lifetime.total_processed,
            success = lifetime.total_success,
            failed = lifetime.total_failed,
            retries = lifetime.total_retries,
            "queue manager stopped"
        );
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        info!("queue processing paused");
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        info!("queue processing resumed");
    }

    pub async fn add_document(
        &self,
        user_id: Uuid,
        document_id: i64,
        priority: i32,
    ) -> Result<QueueItem, QueueError> {
        let item = self.inner.repo.enqueue(user_id, document_id, priority).await?;
        debug!(
            %user_id,
            document_id,
            priority = item.priority,
            queue_id = %item.id,
            "document queued"
        );
        Ok(item)
    }

    pub async fn add_documents_with_reset(
        &self,
        user_id: Uuid,
        document_ids: &[i64],
        priority: i32,
    ) -> Result<EnqueueSummary, QueueError> {
        let summary = self
            .inner
            .repo
            .enqueue_with_reset(user_id, document_ids, priority)
            .await?;
        info!(
            %user_id,
            added = summary.added,
            already_queued = summary.already_queued,
            reset = summary.queue_was_reset,
            cleared = summary.cleared.total,
            "documents queued"
        );
        Ok(summary)
    }

    /// Takes the next queued item and moves it to processing. A pull whose
    /// document is already in flight is a no-op and leaves the item queued.
    pub async fn claim_next(&self, user_id: Option<Uuid>) -> Result<Option<QueueItem>, QueueError> {
        let mut in_flight = self.inner.in_flight.lock().await;
        let Some(item) = self.inner.repo.next_queued(user_id).await? else {
            return Ok(None);
        };
        let key = (item.user_id, item.paperless_document_id);
        if in_flight.contains(&key) {
            debug!(
                document_id = item.paperless_document_id,
                queue_id = %item.id,
                "document already in flight; skipping"
            );
            return Ok(None);
        }
        let Some(claimed) = self.inner.repo.mark_processing(item.id).await? else {
            return Ok(None);
        };
        in_flight.insert(key);
        Ok(Some(claimed))
    }

    pub async fn process_next(&self, user_id: Option<Uuid>) -> Result<bool, QueueError> {
        let Some(item) = self.claim_next(user_id).await? else {
            return Ok(false);
        };
        info!(
            document_id = item.paperless_document_id,
            queue_id = %item.id,
            "processing queued document"
        );

        let outcome = self.run_item(&item).await;
        self.inner
            .in_flight
            .lock()
            .await
            .remove(&(item.user_id, item.paperless_document_id));
        self.inner.counters.processed.fetch_add(1, Ordering::Relaxed);

        match outcome {
            Ok(record) => {
                self.inner.counters.success.fetch_add(1, Ordering::Relaxed);
                info!(
                    document_id = item.paperless_document_id,
                    queue_id = %item.id,
                    status = %record.status,
                    confidence = record.confidence_score.unwrap_or_default(),
                    "queue item completed"
                );
            }
            Err(err) => {
                self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    document_id = item.paperless_document_id,
                    queue_id = %item.id,
                    error = %err,
                    "queue item failed"
                );
                self.inner.repo.mark_failed(item.id, &err.to_string()).await?;
            }
        }
        Ok(true)
    }

    async fn run_item(&self, item: &QueueItem) -> Result<ProcessedDocument, QueueError> {
        let user = self
            .inner
            .repo
            .get_user(item.user_id)
            .await?
            .ok_or(QueueError::UnknownUser(item.user_id))?;
        let service = self.inner.clients.for_user(&user)?;

        let result = self
            .inner
            .processor
            .process_document(
                service.as_ref(),
                item.paperless_document_id,
                user.id,
                None,
                self.inner.config.retry_attempts,
            )
            .await?;
        let outcome = self.inner.applier.apply(service.as_ref(), &result).await?;
        let run = completed_run(&result, &outcome)?;
        Ok(self.inner.repo.complete_item(item.id, run).await?)
    }

    pub async fn drain(&self, limit: u64) -> Result<u64, QueueError> {
        let mut processed = 0;
        while processed < limit && self.process_next(None).await? {
            processed += 1;
        }
        Ok(processed)
    }

    pub async fn retry_failed(&self, ceiling: i32, user_id: Option<Uuid>) -> Result<u64, QueueError> {
        let requeued = self.inner.repo.retry_failed(ceiling, user_id).await?;
        self.inner
            .counters
            .retries
            .fetch_add(requeued, Ordering::Relaxed);
        info!(ceiling, requeued, "re-queued failed items");
        Ok(requeued)
    }

    pub async fn clear_completed(&self, days: i64, user_id: Option<Uuid>) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - chrono::Duration::days(days.max(0));
        let cleared = self
            .inner
            .repo
            .clear_completed_older_than(cutoff, user_id)
            .await?;
        info!(days, cleared, "cleared completed queue items");
        Ok(cleared)
    }

    pub async fn clear_completed_and_failed(&self, user_id: Uuid) -> Result<ClearedCounts, QueueError> {
        Ok(self.inner.repo.clear_completed_and_failed(user_id).await?)
    }

    pub async fn stats(&self, user_id: Option<Uuid>) -> Result<ManagerStats, QueueError> {
        let queue = self.inner.repo.queue_counts(user_id).await?;
        let uptime_seconds = self
            .inner
            .tasks
            .lock()
            .await
            .as_ref()
            .map_or(0, |tasks| tasks.started_at.elapsed().as_secs());
        Ok(ManagerStats {
            is_running: self.is_running(),
            is_paused: self.is_paused(),
            mode: self.inner.config.mode.as_str(),
            workers: self.inner.config.concurrent_workers,
            uptime_seconds,
            queue,
            lifetime: self.inner.counters.snapshot(),
        })
    }

    async fn worker_loop(self, worker_id: usize, shutdown: CancellationToken) {
        debug!(worker_id, "queue worker started");
        while !shutdown.is_cancelled() {
            let backoff = if self.is_paused() {
                Some(PAUSED_BACKOFF)
            } else {
                match self.process_next(None).await {
                    Ok(true) => None,
                    Ok(false) => Some(IDLE_BACKOFF),
                    Err(err) => {
                        error!(worker_id, error = %err, "queue worker iteration failed");
                        Some(ERROR_BACKOFF)
                    }
                }
            };
            if let Some(delay) = backoff {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(delay) => {}
                }
            }
        }
        debug!(worker_id, "queue worker stopped");
    }

    async fn poll_loop(self, shutdown: CancellationToken) {
        let interval = self.inner.config.polling_interval;
        info!(interval_secs = interval.as_secs(), "realtime polling started");
        let mut watcher = DocumentWatcher::default();
        loop {
            if !self.is_paused() {
                if let Err(err) = watcher.poll(&self).await {
                    error!(error = %err, "polling for new documents failed");
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(interval) => {}
            }
        }
        info!("realtime polling stopped");
    }

    async fn batch_loop(self, shutdown: CancellationToken) {
        let batch = &self.inner.config.batch;
        info!(
            document_threshold = batch.document_threshold,
            time_threshold_secs = batch.time_threshold.as_secs(),
            rule = batch.rule.as_str(),
            schedule = %batch.schedule,
            "batch trigger started"
        );
        let mut trigger = BatchTrigger::new(batch, Instant::now());
        loop {
            if !self.is_paused() {
                if let Err(err) = self.batch_tick(&mut trigger).await {
                    error!(error = %err, "batch run failed");
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(BATCH_TICK) => {}
            }
        }
        info!("batch trigger stopped");
    }

    async fn batch_tick(&self, trigger: &mut BatchTrigger) -> Result<(), QueueError> {
        let queued = self.inner.repo.queue_counts(None).await?.queued;
        let now = Instant::now();
        if !trigger.should_run(queued, now) {
            return Ok(());
        }
        info!(
            queued,
            elapsed_secs = trigger.elapsed(now).as_secs(),
            "batch processing triggered"
        );
        let processed = self.drain(queued).await?;
        trigger.reset(Instant::now());
        info!(processed, "batch processing finished");
        Ok(())
    }
}

fn completed_run(
    result: &ProcessingResult,
    outcome: &ApplyOutcome,
) -> Result<CompletedRun, serde_json::Error> {
    let suggested_data = serde_json::to_value(&result.suggested)?;
    let (status, applied_data, approval_suggestions) = match outcome {
        ApplyOutcome::Applied { update } => (
            ProcessingStatus::Success,
            Some(serde_json::to_value(update)?),
            None,
        ),
        ApplyOutcome::Staged { .. } => (
            ProcessingStatus::PendingApproval,
            None,
            Some(suggested_data.clone()),
        ),
    };
    Ok(CompletedRun {
        user_id: result.user_id,
        paperless_document_id: result.document_id,
        status,
        confidence_score: result.confidence,
        original_data: serde_json::to_value(&result.original)?,
        suggested_data,
        applied_data,
        processing_time_ms: result.processing_time_ms,
        approval_suggestions,
    })
}
