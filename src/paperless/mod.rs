use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::UserAccount;

pub mod client;

pub use client::PaperlessClient;

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Error)]
pub enum PaperlessError {
    #[error("document service resource not found: {0}")]
    NotFound(String),
    #[error("document service rejected credentials (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("document service rate limit exceeded")]
    RateLimited,
    #[error("Paperless API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("document service request timed out")]
    Timeout,
    #[error("document service transport error: {0}")]
    Transport(String),
    #[error("unexpected document service payload: {0}")]
    InvalidResponse(String),
}

pub type PaperlessResult<T> = Result<T, PaperlessError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub correspondent: Option<i64>,
    #[serde(default)]
    pub document_type: Option<i64>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub original_file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: i64,
    pub name: String,
}

pub trait Named {
    fn id(&self) -> i64;
    fn name(&self) -> &str;
}

impl Named for Tag {
    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for NamedEntity {
    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn find_by_name<'a, T: Named>(items: &'a [T], name: &str) -> Option<&'a T> {
    let needle = name.trim().to_lowercase();
    items
        .iter()
        .find(|item| item.name().trim().to_lowercase() == needle)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

pub type DocumentPage = Page<Document>;

#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub page: u32,
    pub page_size: u32,
    pub ordering: Option<String>,
    pub filters: Vec<(String, String)>,
}

impl DocumentQuery {
    pub fn page(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            ..Self::default()
        }
    }

    pub fn ordering(mut self, ordering: impl Into<String>) -> Self {
        self.ordering = Some(ordering.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }
}

/// Partial update; unset fields are left untouched by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correspondent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl DocumentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.correspondent.is_none()
            && self.document_type.is_none()
            && self.tags.is_none()
            && self.created.is_none()
    }
}

#[async_trait]
pub trait DocumentService: Send + Sync + 'static {
    async fn get_document(&self, id: i64) -> PaperlessResult<Document>;

    async fn list_documents(&self, query: &DocumentQuery) -> PaperlessResult<DocumentPage>;

    async fn update_document(&self, id: i64, update: &DocumentUpdate) -> PaperlessResult<Document>;

    async fn get_document_types(&self) -> PaperlessResult<Vec<NamedEntity>>;

    async fn get_tags(&self) -> PaperlessResult<Vec<Tag>>;

    async fn get_correspondents(&self) -> PaperlessResult<Vec<NamedEntity>>;

    async fn create_document_type(&self, name: &str) -> PaperlessResult<NamedEntity>;

    async fn create_tag(&self, name: &str, color: Option<&str>) -> PaperlessResult<Tag>;

    async fn create_correspondent(&self, name: &str) -> PaperlessResult<NamedEntity>;

    async fn health_check(&self) -> bool;

    /// Checks the client's token, or `token` when given, against the API root.
    async fn validate_credentials(&self, token: Option<&str>) -> PaperlessResult<Value>;
}

pub trait DocumentServiceFactory: Send + Sync + 'static {
    fn for_user(&self, user: &UserAccount) -> PaperlessResult<Arc<dyn DocumentService>>;
}

pub struct PaperlessClientFactory {
    timeout: Duration,
    pool_size: usize,
}

impl PaperlessClientFactory {
    pub fn new(timeout: Duration, pool_size: usize) -> Self {
        Self { timeout, pool_size }
    }
}

impl DocumentServiceFactory for PaperlessClientFactory {
    fn for_user(&self, user: &UserAccount) -> PaperlessResult<Arc<dyn DocumentService>> {
        let client = PaperlessClient::new(
            &user.paperless_url,
            &user.paperless_token,
            self.timeout,
            self.pool_size,
        )?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_entities_ignoring_case_and_padding() {
        let entities = vec![
            NamedEntity {
                id: 1,
                name: "ACME Corp".into(),
            },
            NamedEntity {
                id: 2,
                name: "Stadtwerke".into(),
            },
        ];
        assert_eq!(find_by_name(&entities, " acme corp").map(|e| e.id), Some(1));
        assert!(find_by_name(&entities, "ACME").is_none());
    }

    #[test]
    fn update_serializes_only_set_fields() {
        let update = DocumentUpdate {
            title: Some("Invoice".into()),
            tags: Some(vec![3, 4]),
            ..DocumentUpdate::default()
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, serde_json::json!({"title": "Invoice", "tags": [3, 4]}));
        assert!(DocumentUpdate::default().is_empty());
    }

    #[test]
    fn query_clamps_page_size() {
        let query = DocumentQuery::page(0, 500);
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, MAX_PAGE_SIZE);
    }
}
