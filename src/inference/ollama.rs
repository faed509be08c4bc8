use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use moka::sync::Cache;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{Completion, CompletionRequest, InferenceClient, InferenceError, InferenceResult};
use crate::config::InferenceConfig;

const MODEL_CACHE_TTL: Duration = Duration::from_secs(300);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const CHARS_PER_TOKEN: usize = 4;

const MODEL_ALIASES: &[(&str, &str)] = &[
    ("llama3", "llama3.2"),
    ("llama3-8b", "llama3.1:8b"),
    ("llama3-70b", "llama3.1:70b"),
    ("mistral-7b", "mistral:7b"),
    ("mixtral", "mixtral:8x7b"),
];

const CONTEXT_LIMITS: &[(&str, usize)] = &[
    ("llama3.2", 128_000),
    ("llama3.1", 128_000),
    ("llama3", 8_192),
    ("mixtral", 32_768),
    ("mistral", 32_768),
    ("qwen2.5", 32_768),
    ("gemma2", 8_192),
    ("phi3", 4_096),
];
const DEFAULT_CONTEXT_LIMIT: usize = 4_096;

pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
    models: Cache<(), Vec<String>>,
}

impl OllamaClient {
    pub fn from_config(config: &InferenceConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build inference HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: resolve_model_alias(&config.model),
            timeout: config.timeout,
            max_retries: config.max_retries.max(1),
            models: Cache::builder()
                .max_capacity(1)
                .time_to_live(MODEL_CACHE_TTL)
                .build(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn warn_on_long_context(&self, request: &CompletionRequest) {
        let chars = request.prompt.len()
            + request
                .system_prompt
                .as_deref()
                .map(str::len)
                .unwrap_or_default();
        let estimated = chars / CHARS_PER_TOKEN;
        let limit = context_limit(&self.model);
        if estimated * 10 > limit * 8 {
            warn!(
                model = %self.model,
                estimated_tokens = estimated,
                context_limit = limit,
                "prompt is close to the model context window"
            );
        }
    }

    async fn send_generate(&self, request: &CompletionRequest) -> InferenceResult<Completion> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system_prompt.as_deref(),
            stream: false,
            format: request.json_mode.then_some("json"),
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(self.model_not_found().await);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if text.to_ascii_lowercase().contains("not found") {
                return Err(self.model_not_found().await);
            }
            return Err(InferenceError::Http {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|err| InferenceError::InvalidResponse(err.to_string()))?;

        Ok(Completion {
            content: payload.response,
            model: payload.model.unwrap_or_else(|| self.model.clone()),
            prompt_tokens: payload.prompt_eval_count,
            completion_tokens: payload.eval_count,
        })
    }

    fn classify(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else if err.is_connect() {
            InferenceError::Connection {
                base_url: self.base_url.clone(),
            }
        } else {
            InferenceError::Transport(err.to_string())
        }
    }

    async fn model_not_found(&self) -> InferenceError {
        let available = self
            .list_models()
            .await
            .unwrap_or_default()
            .into_iter()
            .take(5)
            .collect();
        InferenceError::ModelNotFound {
            model: self.model.clone(),
            available,
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn generate(&self, request: &CompletionRequest) -> InferenceResult<Completion> {
        self.warn_on_long_context(request);

        let mut attempt = 0;
        loop {
            match self.send_generate(request).await {
                Ok(completion) => {
                    debug!(
                        model = %completion.model,
                        total_tokens = ?completion.total_tokens(),
                        "inference completed"
                    );
                    return Ok(completion);
                }
                Err(InferenceError::Timeout { seconds }) if attempt + 1 < self.max_retries => {
                    let delay = Duration::from_secs(1 << attempt);
                    warn!(
                        attempt = attempt + 1,
                        timeout_secs = seconds,
                        "inference request timed out; retrying in {delay:?}"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn list_models(&self) -> InferenceResult<Vec<String>> {
        if let Some(models) = self.models.get(&()) {
            return Ok(models);
        }

        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| self.classify(err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|err| InferenceError::InvalidResponse(err.to_string()))?;
        let models: Vec<String> = tags.models.into_iter().map(|model| model.name).collect();
        self.models.insert((), models.clone());
        Ok(models)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "inference health check failed");
                false
            }
        }
    }
}

pub fn resolve_model_alias(name: &str) -> String {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, target)| target.to_string())
        .unwrap_or_else(|| name.to_string())
}

fn context_limit(model: &str) -> usize {
    let base = model.split(':').next().unwrap_or(model);
    CONTEXT_LIMITS
        .iter()
        .find(|(name, _)| *name == base)
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_LIMIT)
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    model: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}
