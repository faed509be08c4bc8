#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Utc};
use docpilot::auth::jwt::{Claims, JwtService};
use docpilot::config::{
    AppConfig, ApprovalConfig, AutoCreationConfig, InferenceConfig, NamingConfig,
    ProcessingConfig, ProcessingMode, TaggingConfig,
};
use docpilot::inference::{Completion, CompletionRequest, InferenceClient, InferenceError, InferenceResult};
use docpilot::models::{
    ApprovalEntry, ApprovalStats, ApprovalStatus, ClearedCounts, CompletedRun, EnqueueSummary,
    ProcessedDocument, ProcessingStats, ProcessingStatus, QueueCounts, QueueItem, QueueStatus,
    UserAccount,
};
use docpilot::paperless::{
    Document, DocumentPage, DocumentQuery, DocumentService, DocumentServiceFactory,
    DocumentUpdate, NamedEntity, PaperlessError, PaperlessResult, Tag,
};
use docpilot::repository::{MemoryRepository, Repository, RepositoryError, RepositoryResult};
use docpilot::routes;
use docpilot::state::AppState;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const ACME_DOCUMENT_ID: i64 = 501;
pub const ACME_OCR: &str =
    "INVOICE #1001\nACME Corp\n12 Industrial Way\nInvoice date: 2024-03-15\nTotal $250.00";

const TEST_SECRET: &str = "test-secret";
const TEST_ISSUER: &str = "test-issuer";
const TEST_AUDIENCE: &str = "test-audience";

/// Pipeline stage a prompt belongs to, recognised by its opening line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Correspondent,
    DocumentType,
    Tags,
    Date,
    Title,
}

impl PromptKind {
    fn of(prompt: &str) -> Option<Self> {
        let markers = [
            ("identify the correspondent", Self::Correspondent),
            ("classify its type", Self::DocumentType),
            ("suggest relevant tags", Self::Tags),
            ("extract the most relevant date", Self::Date),
            ("generate a concise, descriptive title", Self::Title),
        ];
        markers
            .iter()
            .find(|(marker, _)| prompt.contains(marker))
            .map(|(_, kind)| *kind)
    }
}

pub enum Reply {
    Text(String),
    Fail(InferenceError),
}

/// Scripted inference service. Each stage has a default reply; one-shot
/// replies queued with [`FakeInference::push`] take precedence.
pub struct FakeInference {
    defaults: Mutex<HashMap<PromptKind, String>>,
    scripted: Mutex<HashMap<PromptKind, VecDeque<Reply>>>,
    failures: Mutex<VecDeque<InferenceError>>,
    always_fail: Mutex<Option<InferenceError>>,
    hang: Mutex<bool>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeInference {
    /// Replies describing the ACME invoice.
    pub fn acme() -> Self {
        let defaults = HashMap::from([
            (
                PromptKind::Correspondent,
                json!({"correspondent": "acme corp", "confidence": 0.92, "reasoning": "letterhead"})
                    .to_string(),
            ),
            (
                PromptKind::DocumentType,
                json!({"document_type": "Invoice", "confidence": 0.88}).to_string(),
            ),
            (
                PromptKind::Tags,
                json!({"tags": ["Finance", "Invoices"], "confidences": [0.9, 0.8]}).to_string(),
            ),
            (
                PromptKind::Date,
                json!({"document_date": "2024-03-15", "date_type": "invoice_date", "confidence": 0.85})
                    .to_string(),
            ),
            (
                PromptKind::Title,
                json!({"title": "ACME Corp Invoice 1001", "confidence": 0.8}).to_string(),
            ),
        ]);
        Self {
            defaults: Mutex::new(defaults),
            scripted: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            always_fail: Mutex::new(None),
            hang: Mutex::new(false),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn set_default(&self, kind: PromptKind, reply: Value) {
        self.defaults.lock().await.insert(kind, reply.to_string());
    }

    pub async fn push(&self, kind: PromptKind, reply: Reply) {
        self.scripted
            .lock()
            .await
            .entry(kind)
            .or_default()
            .push_back(reply);
    }

    /// The next `count` calls fail with `error`, whatever the stage.
    pub async fn fail_next(&self, count: usize, error: InferenceError) {
        let mut failures = self.failures.lock().await;
        for _ in 0..count {
            failures.push_back(error.clone());
        }
    }

    pub async fn fail_always(&self, error: InferenceError) {
        *self.always_fail.lock().await = Some(error);
    }

    /// Every later call blocks forever.
    pub async fn hang(&self) {
        *self.hang.lock().await = true;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl InferenceClient for FakeInference {
    async fn generate(&self, request: &CompletionRequest) -> InferenceResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().await.push(request.prompt.clone());

        if *self.hang.lock().await {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.always_fail.lock().await.clone() {
            return Err(error);
        }
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }

        let kind = PromptKind::of(&request.prompt)
            .ok_or_else(|| InferenceError::InvalidResponse("unrecognised prompt".into()))?;
        let scripted = self
            .scripted
            .lock()
            .await
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        let content = match scripted {
            Some(Reply::Text(text)) => text,
            Some(Reply::Fail(error)) => return Err(error),
            None => self
                .defaults
                .lock()
                .await
                .get(&kind)
                .cloned()
                .unwrap_or_else(|| "{}".to_string()),
        };
        Ok(Completion {
            content,
            model: "fake-model".into(),
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
        })
    }

    async fn list_models(&self) -> InferenceResult<Vec<String>> {
        Ok(vec!["llama3.2:latest".into(), "mistral:latest".into()])
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Delegates to a [`MemoryRepository`], failing selected calls on demand.
pub struct FlakyRepository {
    inner: Arc<MemoryRepository>,
    enqueue_failures: AtomicUsize,
    next_queued_failures: AtomicUsize,
}

impl FlakyRepository {
    pub fn new(inner: Arc<MemoryRepository>) -> Self {
        Self {
            inner,
            enqueue_failures: AtomicUsize::new(0),
            next_queued_failures: AtomicUsize::new(0),
        }
    }

    pub fn fail_enqueue(&self, count: usize) {
        self.enqueue_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_queued(&self, count: usize) {
        self.next_queued_failures.store(count, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize, call: &str) -> RepositoryResult<()> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1)) {
            Ok(_) => Err(RepositoryError::Pool(format!("{call}: connection refused"))),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn get_user(&self, user_id: Uuid) -> RepositoryResult<Option<UserAccount>> {
        self.inner.get_user(user_id).await
    }

    async fn active_users(&self) -> RepositoryResult<Vec<UserAccount>> {
        self.inner.active_users().await
    }

    async fn enqueue(
        &self,
        user_id: Uuid,
        document_id: i64,
        priority: i32,
    ) -> RepositoryResult<QueueItem> {
        Self::take_failure(&self.enqueue_failures, "enqueue")?;
        self.inner.enqueue(user_id, document_id, priority).await
    }

    async fn enqueue_with_reset(
        &self,
        user_id: Uuid,
        document_ids: &[i64],
        priority: i32,
    ) -> RepositoryResult<EnqueueSummary> {
        self.inner
            .enqueue_with_reset(user_id, document_ids, priority)
            .await
    }

    async fn next_queued(&self, user_id: Option<Uuid>) -> RepositoryResult<Option<QueueItem>> {
        Self::take_failure(&self.next_queued_failures, "next_queued")?;
        self.inner.next_queued(user_id).await
    }

    async fn mark_processing(&self, item_id: Uuid) -> RepositoryResult<Option<QueueItem>> {
        self.inner.mark_processing(item_id).await
    }

    async fn mark_failed(&self, item_id: Uuid, error: &str) -> RepositoryResult<()> {
        self.inner.mark_failed(item_id, error).await
    }

    async fn complete_item(
        &self,
        item_id: Uuid,
        run: CompletedRun,
    ) -> RepositoryResult<ProcessedDocument> {
        self.inner.complete_item(item_id, run).await
    }

    async fn retry_item(&self, item_id: Uuid) -> RepositoryResult<bool> {
        self.inner.retry_item(item_id).await
    }

    async fn retry_failed(&self, max_retries: i32, user_id: Option<Uuid>) -> RepositoryResult<u64> {
        self.inner.retry_failed(max_retries, user_id).await
    }

    async fn queue_counts(&self, user_id: Option<Uuid>) -> RepositoryResult<QueueCounts> {
        self.inner.queue_counts(user_id).await
    }

    async fn is_queue_empty(&self, user_id: Uuid) -> RepositoryResult<bool> {
        self.inner.is_queue_empty(user_id).await
    }

    async fn clear_completed_and_failed(&self, user_id: Uuid) -> RepositoryResult<ClearedCounts> {
        self.inner.clear_completed_and_failed(user_id).await
    }

    async fn clear_completed_older_than(
        &self,
        cutoff: DateTime<Utc>,
        user_id: Option<Uuid>,
    ) -> RepositoryResult<u64> {
        self.inner.clear_completed_older_than(cutoff, user_id).await
    }

    async fn list_queue(
        &self,
        user_id: Uuid,
        status: Option<QueueStatus>,
        limit: i64,
    ) -> RepositoryResult<Vec<QueueItem>> {
        self.inner.list_queue(user_id, status, limit).await
    }

    async fn get_processed(
        &self,
        user_id: Uuid,
        document_id: i64,
    ) -> RepositoryResult<Option<ProcessedDocument>> {
        self.inner.get_processed(user_id, document_id).await
    }

    async fn get_processed_by_id(
        &self,
        record_id: Uuid,
    ) -> RepositoryResult<Option<ProcessedDocument>> {
        self.inner.get_processed_by_id(record_id).await
    }

    async fn list_processed(
        &self,
        user_id: Uuid,
        status: Option<ProcessingStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<ProcessedDocument>> {
        self.inner.list_processed(user_id, status, limit, offset).await
    }

    async fn processing_stats(&self, user_id: Uuid) -> RepositoryResult<ProcessingStats> {
        self.inner.processing_stats(user_id).await
    }

    async fn processed_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ProcessedDocument>> {
        self.inner.processed_between(user_id, from, to).await
    }

    async fn list_approvals(
        &self,
        user_id: Uuid,
        status: Option<ApprovalStatus>,
    ) -> RepositoryResult<Vec<ApprovalEntry>> {
        self.inner.list_approvals(user_id, status).await
    }

    async fn get_approval(&self, approval_id: Uuid) -> RepositoryResult<Option<ApprovalEntry>> {
        self.inner.get_approval(approval_id).await
    }

    async fn resolve_approval(
        &self,
        approval_id: Uuid,
        decision: ApprovalStatus,
        feedback: Option<String>,
        applied: Option<Value>,
    ) -> RepositoryResult<Option<ApprovalEntry>> {
        self.inner
            .resolve_approval(approval_id, decision, feedback, applied)
            .await
    }

    async fn approval_stats(&self, user_id: Uuid) -> RepositoryResult<ApprovalStats> {
        self.inner.approval_stats(user_id).await
    }
}

#[derive(Default)]
struct FakeDocs {
    documents: HashMap<i64, Document>,
    correspondents: Vec<NamedEntity>,
    document_types: Vec<NamedEntity>,
    tags: Vec<Tag>,
    next_id: i64,
    updates: Vec<(i64, DocumentUpdate)>,
    get_failure: Option<PaperlessError>,
}

impl FakeDocs {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        1000 + self.next_id
    }
}

/// In-memory stand-in for the document service.
#[derive(Default)]
pub struct FakeDocumentService {
    docs: Mutex<FakeDocs>,
    get_document_calls: AtomicUsize,
    created_entities: AtomicUsize,
}

impl FakeDocumentService {
    /// A service holding the ACME invoice, an "ACME Corp" correspondent, an
    /// "Invoice" type and a "Finance" tag.
    pub async fn acme() -> Self {
        let service = Self::default();
        service.add_correspondent(1, "ACME Corp").await;
        service.add_document_type(2, "Invoice").await;
        service.add_tag(3, "Finance").await;
        service
            .insert_document(document(ACME_DOCUMENT_ID, ACME_OCR, vec![]))
            .await;
        service
    }

    pub async fn insert_document(&self, document: Document) {
        self.docs
            .lock()
            .await
            .documents
            .insert(document.id, document);
    }

    pub async fn add_correspondent(&self, id: i64, name: &str) {
        self.docs.lock().await.correspondents.push(NamedEntity {
            id,
            name: name.into(),
        });
    }

    pub async fn add_document_type(&self, id: i64, name: &str) {
        self.docs.lock().await.document_types.push(NamedEntity {
            id,
            name: name.into(),
        });
    }

    pub async fn add_tag(&self, id: i64, name: &str) {
        self.docs.lock().await.tags.push(Tag {
            id,
            name: name.into(),
            color: None,
        });
    }

    pub async fn fail_get_document(&self, error: PaperlessError) {
        self.docs.lock().await.get_failure = Some(error);
    }

    pub async fn document(&self, id: i64) -> Option<Document> {
        self.docs.lock().await.documents.get(&id).cloned()
    }

    pub async fn updates(&self) -> Vec<(i64, DocumentUpdate)> {
        self.docs.lock().await.updates.clone()
    }

    pub async fn tag_named(&self, name: &str) -> Option<Tag> {
        self.docs
            .lock()
            .await
            .tags
            .iter()
            .find(|tag| tag.name == name)
            .cloned()
    }

    pub async fn correspondents(&self) -> Vec<NamedEntity> {
        self.docs.lock().await.correspondents.clone()
    }

    pub fn get_document_calls(&self) -> usize {
        self.get_document_calls.load(Ordering::SeqCst)
    }

    pub fn created_entities(&self) -> usize {
        self.created_entities.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentService for FakeDocumentService {
    async fn get_document(&self, id: i64) -> PaperlessResult<Document> {
        self.get_document_calls.fetch_add(1, Ordering::SeqCst);
        let docs = self.docs.lock().await;
        if let Some(error) = &docs.get_failure {
            return Err(error.clone());
        }
        docs.documents
            .get(&id)
            .cloned()
            .ok_or_else(|| PaperlessError::NotFound(format!("document {id}")))
    }

    async fn list_documents(&self, query: &DocumentQuery) -> PaperlessResult<DocumentPage> {
        let docs = self.docs.lock().await;
        let mut all: Vec<Document> = docs.documents.values().cloned().collect();
        all.sort_by_key(|doc| doc.id);
        if query.ordering.as_deref() == Some("-id") {
            all.reverse();
        }
        let size = query.page_size.max(1) as usize;
        let start = (query.page.max(1) as usize - 1) * size;
        let results: Vec<Document> = all.iter().skip(start).take(size).cloned().collect();
        let next = (start + size < all.len()).then(|| format!("page={}", query.page + 1));
        Ok(DocumentPage {
            count: all.len() as u64,
            next,
            previous: None,
            results,
        })
    }

    async fn update_document(&self, id: i64, update: &DocumentUpdate) -> PaperlessResult<Document> {
        let mut docs = self.docs.lock().await;
        docs.updates.push((id, update.clone()));
        let document = docs
            .documents
            .get_mut(&id)
            .ok_or_else(|| PaperlessError::NotFound(format!("document {id}")))?;
        if let Some(title) = &update.title {
            document.title = title.clone();
        }
        if let Some(correspondent) = update.correspondent {
            document.correspondent = Some(correspondent);
        }
        if let Some(document_type) = update.document_type {
            document.document_type = Some(document_type);
        }
        if let Some(tags) = &update.tags {
            document.tags = tags.clone();
        }
        if let Some(created) = &update.created {
            document.created = Some(created.clone());
        }
        Ok(document.clone())
    }

    async fn get_document_types(&self) -> PaperlessResult<Vec<NamedEntity>> {
        Ok(self.docs.lock().await.document_types.clone())
    }

    async fn get_tags(&self) -> PaperlessResult<Vec<Tag>> {
        Ok(self.docs.lock().await.tags.clone())
    }

    async fn get_correspondents(&self) -> PaperlessResult<Vec<NamedEntity>> {
        Ok(self.docs.lock().await.correspondents.clone())
    }

    async fn create_document_type(&self, name: &str) -> PaperlessResult<NamedEntity> {
        self.created_entities.fetch_add(1, Ordering::SeqCst);
        let mut docs = self.docs.lock().await;
        let entity = NamedEntity {
            id: docs.allocate_id(),
            name: name.into(),
        };
        docs.document_types.push(entity.clone());
        Ok(entity)
    }

    async fn create_tag(&self, name: &str, color: Option<&str>) -> PaperlessResult<Tag> {
        self.created_entities.fetch_add(1, Ordering::SeqCst);
        let mut docs = self.docs.lock().await;
        let tag = Tag {
            id: docs.allocate_id(),
            name: name.into(),
            color: color.map(str::to_string),
        };
        docs.tags.push(tag.clone());
        Ok(tag)
    }

    async fn create_correspondent(&self, name: &str) -> PaperlessResult<NamedEntity> {
        self.created_entities.fetch_add(1, Ordering::SeqCst);
        let mut docs = self.docs.lock().await;
        let entity = NamedEntity {
            id: docs.allocate_id(),
            name: name.into(),
        };
        docs.correspondents.push(entity.clone());
        Ok(entity)
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn validate_credentials(&self, _token: Option<&str>) -> PaperlessResult<Value> {
        Ok(json!({"username": "fake"}))
    }
}

/// Hands every user the same fake service.
pub struct FakeClients {
    service: Arc<FakeDocumentService>,
}

impl FakeClients {
    pub fn new(service: Arc<FakeDocumentService>) -> Self {
        Self { service }
    }
}

impl DocumentServiceFactory for FakeClients {
    fn for_user(&self, _user: &UserAccount) -> PaperlessResult<Arc<dyn DocumentService>> {
        Ok(self.service.clone())
    }
}

pub fn document(id: i64, content: &str, tags: Vec<i64>) -> Document {
    Document {
        id,
        title: format!("scan-{id}"),
        content: content.into(),
        created: None,
        correspondent: None,
        document_type: None,
        tags,
        original_file_name: Some(format!("scan-{id}.pdf")),
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: None,
        database_max_pool_size: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: TEST_SECRET.to_string(),
        jwt_issuer: TEST_ISSUER.to_string(),
        jwt_audience: TEST_AUDIENCE.to_string(),
        cors_allowed_origin: None,
        paperless_timeout: Duration::from_secs(5),
        paperless_pool_size: 2,
        inference: InferenceConfig::default(),
        processing: ProcessingConfig {
            mode: ProcessingMode::Manual,
            concurrent_workers: 2,
            shutdown_timeout: Duration::from_secs(2),
            ..ProcessingConfig::default()
        },
        approval: ApprovalConfig::default(),
        auto_creation: AutoCreationConfig::default(),
        tagging: TaggingConfig::default(),
        naming: NamingConfig::default(),
    }
}

pub struct TestApp {
    pub state: AppState,
    pub repo: Arc<MemoryRepository>,
    pub flaky: Arc<FlakyRepository>,
    pub inference: Arc<FakeInference>,
    pub paperless: Arc<FakeDocumentService>,
    pub user: UserAccount,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Result<Self> {
        let repo = Arc::new(MemoryRepository::new());
        let user = UserAccount::new("alice", "http://paperless.test", "paperless-token");
        repo.insert_user(user.clone()).await;

        let inference = Arc::new(FakeInference::acme());
        let paperless = Arc::new(FakeDocumentService::acme().await);
        let jwt = JwtService::new(&config.jwt_secret, &config.jwt_issuer, &config.jwt_audience);

        let flaky = Arc::new(FlakyRepository::new(repo.clone()));
        let repo_for_state: Arc<dyn Repository> = flaky.clone();
        let inference_for_state: Arc<dyn InferenceClient> = inference.clone();
        let clients: Arc<dyn DocumentServiceFactory> =
            Arc::new(FakeClients::new(paperless.clone()));
        let state = AppState::new(config, repo_for_state, inference_for_state, clients, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            repo,
            flaky,
            inference,
            paperless,
            user,
            router,
        })
    }

    pub fn token(&self) -> Result<String> {
        token_for(&self.user, TEST_SECRET)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<Response> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<Response> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body))?).await
    }

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<Response> {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<Response> {
        let mut builder = Request::builder().method(Method::DELETE).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub fn token_for(user: &UserAccount, secret: &str) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        role: "user".into(),
        iss: TEST_ISSUER.into(),
        aud: TEST_AUDIENCE.into(),
        iat: now.timestamp() as usize,
        exp: (now + chrono::Duration::minutes(30)).timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json(response: Response) -> Result<Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
