use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    Document, DocumentPage, DocumentQuery, DocumentService, DocumentUpdate, NamedEntity, Page,
    PaperlessError, PaperlessResult, Tag,
};

const DEFAULT_TAG_COLOR: &str = "#a6cee3";
const MAX_LIST_PAGES: usize = 200;

/// REST client for one Paperless-ngx account.
pub struct PaperlessClient {
    http: Client,
    base_url: String,
    token: String,
}

impl PaperlessClient {
    pub fn new(
        base_url: &str,
        token: &str,
        timeout: Duration,
        pool_size: usize,
    ) -> PaperlessResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(pool_size.max(1))
            .build()
            .map_err(|err| PaperlessError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let token = token.unwrap_or(&self.token);
        builder
            .header(AUTHORIZATION, format!("Token {token}"))
            .header(ACCEPT, "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> PaperlessResult<Response> {
        let response = self
            .authorized(builder, None)
            .send()
            .await
            .map_err(transport_error)?;
        error_for_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> PaperlessResult<T> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|err| PaperlessError::InvalidResponse(err.to_string()))
    }

    /// Follows `next` links until the listing is exhausted.
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> PaperlessResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(format!("{}?page_size={}", self.url(path), super::MAX_PAGE_SIZE));
        let mut pages = 0;

        while let Some(url) = next.take() {
            let page: Page<T> = self.send_json(self.http.get(&url)).await?;
            items.extend(page.results);
            pages += 1;
            if pages >= MAX_LIST_PAGES {
                break;
            }
            next = page.next;
        }

        Ok(items)
    }

    async fn create<T: DeserializeOwned>(&self, path: &str, body: Value) -> PaperlessResult<T> {
        self.send_json(self.http.post(self.url(path)).json(&body))
            .await
    }
}

#[async_trait]
impl DocumentService for PaperlessClient {
    async fn get_document(&self, id: i64) -> PaperlessResult<Document> {
        debug!(document_id = id, "fetching document");
        self.send_json(self.http.get(self.url(&format!("/api/documents/{id}/"))))
            .await
    }

    async fn list_documents(&self, query: &DocumentQuery) -> PaperlessResult<DocumentPage> {
        let mut params: Vec<(String, String)> = vec![
            ("page".to_string(), query.page.max(1).to_string()),
            (
                "page_size".to_string(),
                query.page_size.clamp(1, super::MAX_PAGE_SIZE).to_string(),
            ),
        ];
        if let Some(ordering) = &query.ordering {
            params.push(("ordering".to_string(), ordering.clone()));
        }
        params.extend(query.filters.iter().cloned());

        self.send_json(self.http.get(self.url("/api/documents/")).query(&params))
            .await
    }

    async fn update_document(&self, id: i64, update: &DocumentUpdate) -> PaperlessResult<Document> {
        debug!(document_id = id, ?update, "updating document");
        self.send_json(
            self.http
                .patch(self.url(&format!("/api/documents/{id}/")))
                .json(update),
        )
        .await
    }

    async fn get_document_types(&self) -> PaperlessResult<Vec<NamedEntity>> {
        self.list_all("/api/document_types/").await
    }

    async fn get_tags(&self) -> PaperlessResult<Vec<Tag>> {
        self.list_all("/api/tags/").await
    }

    async fn get_correspondents(&self) -> PaperlessResult<Vec<NamedEntity>> {
        self.list_all("/api/correspondents/").await
    }

    async fn create_document_type(&self, name: &str) -> PaperlessResult<NamedEntity> {
        self.create("/api/document_types/", entity_body(name)).await
    }

    async fn create_tag(&self, name: &str, color: Option<&str>) -> PaperlessResult<Tag> {
        let mut body = entity_body(name);
        body["color"] = json!(color.unwrap_or(DEFAULT_TAG_COLOR));
        body["is_inbox_tag"] = json!(false);
        self.create("/api/tags/", body).await
    }

    async fn create_correspondent(&self, name: &str) -> PaperlessResult<NamedEntity> {
        self.create("/api/correspondents/", entity_body(name)).await
    }

    async fn health_check(&self) -> bool {
        match self
            .authorized(self.http.get(self.url("/api/")), None)
            .send()
            .await
        {
            Ok(response) => matches!(
                response.status(),
                StatusCode::OK | StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
            ),
            Err(err) => {
                debug!(error = %err, "document service health check failed");
                false
            }
        }
    }

    async fn validate_credentials(&self, token: Option<&str>) -> PaperlessResult<Value> {
        let response = self
            .authorized(self.http.get(self.url("/api/")), token)
            .send()
            .await
            .map_err(transport_error)?;
        let response = error_for_status(response).await?;
        Ok(response.json().await.unwrap_or_else(|_| json!({})))
    }
}

fn entity_body(name: &str) -> Value {
    json!({
        "name": name,
        "match": "",
        "matching_algorithm": 1,
        "is_insensitive": true,
    })
}

fn transport_error(err: reqwest::Error) -> PaperlessError {
    if err.is_timeout() {
        PaperlessError::Timeout
    } else {
        PaperlessError::Transport(err.to_string())
    }
}

async fn error_for_status(response: Response) -> PaperlessResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let fallback = status.canonical_reason().unwrap_or("request failed").to_string();
    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(fallback);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PaperlessError::Auth {
            status: status.as_u16(),
            message,
        },
        StatusCode::NOT_FOUND => PaperlessError::NotFound(url),
        StatusCode::TOO_MANY_REQUESTS => PaperlessError::RateLimited,
        _ => PaperlessError::Api {
            status: status.as_u16(),
            message,
        },
    })
}
