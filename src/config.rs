use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant specialized in document classification and metadata extraction for document management systems. Analyze documents and provide structured metadata.";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub cors_allowed_origin: Option<String>,
    pub paperless_timeout: Duration,
    pub paperless_pool_size: usize,
    pub inference: InferenceConfig,
    pub processing: ProcessingConfig,
    pub approval: ApprovalConfig,
    pub auto_creation: AutoCreationConfig,
    pub tagging: TaggingConfig,
    pub naming: NamingConfig,
}

#[derive(Clone, Debug)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub system_prompt: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingMode {
    Realtime,
    Batch,
    Manual,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Batch => "batch",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for ProcessingMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "realtime" => Ok(Self::Realtime),
            "batch" => Ok(Self::Batch),
            "manual" => Ok(Self::Manual),
            other => bail!("unknown processing mode `{other}`"),
        }
    }
}

/// How the batch trigger combines its two thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchRule {
    Either,
    Both,
}

impl BatchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Either => "either",
            Self::Both => "both",
        }
    }
}

impl FromStr for BatchRule {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "either" => Ok(Self::Either),
            "both" => Ok(Self::Both),
            other => bail!("unknown batch rule `{other}`"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub document_threshold: u64,
    pub time_threshold: Duration,
    pub rule: BatchRule,
    /// Reported only; the trigger itself evaluates the two thresholds.
    pub schedule: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            document_threshold: 100,
            time_threshold: Duration::from_secs(3600),
            rule: BatchRule::Either,
            schedule: "0 2 * * *".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProcessingConfig {
    pub mode: ProcessingMode,
    pub polling_interval: Duration,
    pub concurrent_workers: usize,
    pub retry_attempts: u32,
    pub shutdown_timeout: Duration,
    pub batch: BatchConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::Realtime,
            polling_interval: Duration::from_secs(30),
            concurrent_workers: 1,
            retry_attempts: 3,
            shutdown_timeout: Duration::from_secs(30),
            batch: BatchConfig::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApprovalConfig {
    pub enabled: bool,
    pub pending_tag: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pending_tag: "approval-pending".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AutoCreationConfig {
    pub correspondents: bool,
    pub document_types: bool,
    pub tags: bool,
}

impl Default for AutoCreationConfig {
    fn default() -> Self {
        Self {
            correspondents: true,
            document_types: false,
            tags: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaggingConfig {
    pub processing_tag_enabled: bool,
    pub processing_tag: String,
    pub min_tags: usize,
    pub max_tags: usize,
    pub confidence_threshold: f64,
    pub excluded_tags: Vec<String>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            processing_tag_enabled: true,
            processing_tag: "ai-processed".to_string(),
            min_tags: 0,
            max_tags: 10,
            confidence_threshold: 0.7,
            excluded_tags: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NamingConfig {
    pub template: String,
    pub max_title_length: usize,
    pub clean_special_chars: bool,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            template: "{date}_{correspondent}_{type}_{title}".to_string(),
            max_title_length: 100,
            clean_special_chars: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = parse_var("SERVER_PORT", 3000u16)?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "docpilot".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "docpilot-clients".to_string());
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let paperless_timeout = Duration::from_secs(parse_var("PAPERLESS_TIMEOUT_SECS", 30u64)?);
        let paperless_pool_size = parse_var("PAPERLESS_POOL_SIZE", 5usize)?;

        let inference_defaults = InferenceConfig::default();
        let inference = InferenceConfig {
            base_url: env::var("OLLAMA_BASE_URL").unwrap_or(inference_defaults.base_url),
            model: env::var("OLLAMA_MODEL").unwrap_or(inference_defaults.model),
            timeout: Duration::from_secs(parse_var("OLLAMA_TIMEOUT_SECS", 120u64)?),
            max_retries: parse_var("OLLAMA_MAX_RETRIES", inference_defaults.max_retries)?,
            system_prompt: env::var("AI_SYSTEM_PROMPT")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(inference_defaults.system_prompt),
        };

        let batch_defaults = BatchConfig::default();
        let processing = ProcessingConfig {
            mode: env::var("PROCESSING_MODE")
                .unwrap_or_else(|_| "realtime".to_string())
                .parse()
                .context("PROCESSING_MODE must be realtime, batch or manual")?,
            polling_interval: Duration::from_secs(
                parse_var("POLLING_INTERVAL_SECS", 30u64)?.max(5),
            ),
            concurrent_workers: parse_var("CONCURRENT_WORKERS", 1usize)?.clamp(1, 10),
            retry_attempts: parse_var("RETRY_ATTEMPTS", 3u32)?.max(1),
            shutdown_timeout: Duration::from_secs(parse_var("SHUTDOWN_TIMEOUT_SECS", 30u64)?),
            batch: BatchConfig {
                document_threshold: parse_var(
                    "BATCH_DOCUMENT_THRESHOLD",
                    batch_defaults.document_threshold,
                )?,
                time_threshold: Duration::from_secs(parse_var(
                    "BATCH_TIME_THRESHOLD_SECS",
                    3600u64,
                )?),
                rule: env::var("BATCH_RULE")
                    .unwrap_or_else(|_| "either".to_string())
                    .parse()
                    .context("BATCH_RULE must be either or both")?,
                schedule: env::var("BATCH_SCHEDULE").unwrap_or(batch_defaults.schedule),
            },
        };

        let approval = ApprovalConfig {
            enabled: parse_flag("APPROVAL_ENABLED", false),
            pending_tag: env::var("APPROVAL_PENDING_TAG")
                .unwrap_or_else(|_| ApprovalConfig::default().pending_tag),
        };

        let auto_creation = AutoCreationConfig {
            correspondents: parse_flag("AUTO_CREATE_CORRESPONDENTS", true),
            document_types: parse_flag("AUTO_CREATE_DOCUMENT_TYPES", false),
            tags: parse_flag("AUTO_CREATE_TAGS", false),
        };

        let tagging = TaggingConfig {
            processing_tag_enabled: parse_flag("PROCESSING_TAG_ENABLED", true),
            processing_tag: env::var("PROCESSING_TAG_NAME")
                .unwrap_or_else(|_| TaggingConfig::default().processing_tag),
            min_tags: parse_var("TAG_MIN", 0usize)?,
            max_tags: parse_var("TAG_MAX", 10usize)?.max(1),
            confidence_threshold: parse_var("TAG_CONFIDENCE_THRESHOLD", 0.7f64)?.clamp(0.0, 1.0),
            excluded_tags: env::var("TAG_EXCLUDED")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
        };

        let naming = NamingConfig {
            template: env::var("NAMING_TEMPLATE")
                .unwrap_or_else(|_| NamingConfig::default().template),
            max_title_length: parse_var("MAX_TITLE_LENGTH", 100usize)?.max(10),
            clean_special_chars: parse_flag("CLEAN_SPECIAL_CHARS", true),
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            cors_allowed_origin,
            paperless_timeout,
            paperless_pool_size,
            inference,
            processing,
            approval,
            auto_creation,
            tagging,
            naming,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        match &self.database_url {
            Some(url) => redact_database_url(url),
            None => "<in-memory>".to_string(),
        }
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value `{raw}`")),
        _ => Ok(default),
    }
}

fn parse_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
