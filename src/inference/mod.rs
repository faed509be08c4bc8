use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub mod ollama;

pub use ollama::OllamaClient;

pub const JSON_CORRECTION: &str = "\n\nIMPORTANT: Your previous response was not valid JSON. Please respond with ONLY valid JSON, no additional text or explanation.";

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("inference request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("cannot connect to inference service at {base_url}")]
    Connection { base_url: String },
    #[error("model `{model}` not found (available: {available:?})")]
    ModelNotFound {
        model: String,
        available: Vec<String>,
    },
    #[error("inference service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("inference transport error: {0}")]
    Transport(String),
    #[error("inference service returned an unexpected payload: {0}")]
    InvalidResponse(String),
    #[error("model did not return valid JSON: {preview}")]
    InvalidJson { preview: String },
}

impl InferenceError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::ModelNotFound { .. } | Self::InvalidResponse(_) | Self::InvalidJson { .. } => {
                false
            }
        }
    }
}

pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub schema: Option<Value>,
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: None,
            schema: None,
            json_mode: false,
        }
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    fn as_json_request(&self) -> Self {
        let instruction = match &self.schema {
            Some(schema) => format!(
                "You MUST respond with valid JSON matching this schema:\n{}",
                serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
            ),
            None => "You MUST respond with valid JSON only. No other text.".to_string(),
        };
        let system_prompt = match &self.system_prompt {
            Some(base) if !base.trim().is_empty() => format!("{base}\n\n{instruction}"),
            _ => instruction,
        };

        Self {
            system_prompt: Some(system_prompt),
            json_mode: true,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

impl Completion {
    pub fn total_tokens(&self) -> Option<u32> {
        match (self.prompt_tokens, self.completion_tokens) {
            (Some(prompt), Some(completion)) => Some(prompt + completion),
            _ => None,
        }
    }
}

#[async_trait]
pub trait InferenceClient: Send + Sync + 'static {
    async fn generate(&self, request: &CompletionRequest) -> InferenceResult<Completion>;

    async fn generate_json(&self, request: &CompletionRequest) -> InferenceResult<Value> {
        let mut json_request = request.as_json_request();
        let first = self.generate(&json_request).await?;
        if let Some(value) = extract_json(&first.content) {
            return Ok(value);
        }

        warn!(
            preview = %preview(&first.content),
            "model reply was not valid JSON; retrying with correction"
        );
        json_request.prompt.push_str(JSON_CORRECTION);
        let second = self.generate(&json_request).await?;
        extract_json(&second.content).ok_or_else(|| InferenceError::InvalidJson {
            preview: preview(&second.content),
        })
    }

    async fn list_models(&self) -> InferenceResult<Vec<String>>;

    async fn health_check(&self) -> bool;
}

/// Parses a model reply as JSON, tolerating code fences and prose around a
/// single top-level object.
pub fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let unfenced = trimmed
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Some(value);
    }

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&unfenced[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn preview(raw: &str) -> String {
    raw.chars().take(PREVIEW_CHARS).collect()
}
