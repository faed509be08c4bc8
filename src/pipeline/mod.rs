use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, NamingConfig, TaggingConfig, DEFAULT_SYSTEM_PROMPT};
use crate::inference::{InferenceClient, InferenceError};
use crate::paperless::{Document, DocumentService, PaperlessError};

pub mod naming;
pub mod prompts;
pub mod stages;

use naming::NamingVariables;
use stages::{Stage, StageContext, StageResult};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("document {document_id} has no OCR content")]
    EmptyContent { document_id: i64 },
    #[error("Paperless API error for document {document_id}: {source}")]
    DocumentService {
        document_id: i64,
        #[source]
        source: PaperlessError,
    },
    #[error("inference failed for document {document_id}: {source}")]
    Inference {
        document_id: i64,
        #[source]
        source: InferenceError,
    },
    #[error("document {document_id} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        document_id: i64,
        attempts: u32,
        #[source]
        last_error: InferenceError,
    },
}

impl ProcessingError {
    pub fn document_id(&self) -> i64 {
        match self {
            Self::EmptyContent { document_id }
            | Self::DocumentService { document_id, .. }
            | Self::Inference { document_id, .. }
            | Self::RetriesExhausted { document_id, .. } => *document_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub system_prompt: String,
    pub tagging: TaggingConfig,
    pub naming: NamingConfig,
    pub approval_mode: bool,
    /// Base delay of the `2^attempt` backoff between whole-run retries.
    pub retry_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tagging: TaggingConfig::default(),
            naming: NamingConfig::default(),
            approval_mode: false,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.inference.system_prompt.clone(),
            tagging: config.tagging.clone(),
            naming: config.naming.clone(),
            approval_mode: config.approval.enabled,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalMetadata {
    pub title: String,
    pub correspondent: Option<i64>,
    pub document_type: Option<i64>,
    pub tags: Vec<i64>,
    pub created: Option<String>,
}

impl From<&Document> for OriginalMetadata {
    fn from(document: &Document) -> Self {
        Self {
            title: document.title.clone(),
            correspondent: document.correspondent,
            document_type: document.document_type,
            tags: document.tags.clone(),
            created: document.created.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestedMetadata {
    pub correspondent: Option<String>,
    pub correspondent_id: Option<i64>,
    #[serde(default)]
    pub correspondent_is_new: bool,
    pub document_type: Option<String>,
    pub document_type_id: Option<i64>,
    #[serde(default)]
    pub document_type_is_new: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub new_tags: Vec<String>,
    pub document_date: Option<String>,
    pub title: Option<String>,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub document_id: i64,
    pub user_id: Uuid,
    pub original: OriginalMetadata,
    pub suggested: SuggestedMetadata,
    pub confidence: f64,
    pub processing_time_ms: i64,
    pub stages: Vec<StageResult>,
    pub approval_mode: bool,
}

enum RunError {
    EmptyContent,
    DocumentService(PaperlessError),
    Inference(InferenceError),
}

struct RunOutput {
    original: OriginalMetadata,
    suggested: SuggestedMetadata,
    stages: Vec<StageResult>,
}

pub struct DocumentProcessor {
    inference: Arc<dyn InferenceClient>,
    settings: PipelineSettings,
}

impl DocumentProcessor {
    pub fn new(inference: Arc<dyn InferenceClient>, settings: PipelineSettings) -> Self {
        Self {
            inference,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn process_document(
        &self,
        service: &dyn DocumentService,
        document_id: i64,
        user_id: Uuid,
        approval_mode: Option<bool>,
        max_retries: u32,
    ) -> Result<ProcessingResult, ProcessingError> {
        let started = Instant::now();
        let attempts = max_retries.max(1);
        let approval_mode = approval_mode.unwrap_or(self.settings.approval_mode);
        info!(document_id, %user_id, approval_mode, "processing document");

        let mut attempt = 0;
        let output = loop {
            match self.run_once(service, document_id).await {
                Ok(output) => break output,
                Err(RunError::EmptyContent) => {
                    warn!(document_id, "document has no OCR content");
                    return Err(ProcessingError::EmptyContent { document_id });
                }
                Err(RunError::DocumentService(source)) => {
                    return Err(ProcessingError::DocumentService {
                        document_id,
                        source,
                    });
                }
                Err(RunError::Inference(source)) if !source.is_transient() => {
                    return Err(ProcessingError::Inference {
                        document_id,
                        source,
                    });
                }
                Err(RunError::Inference(last_error)) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(ProcessingError::RetriesExhausted {
                            document_id,
                            attempts,
                            last_error,
                        });
                    }
                    let delay = self.settings.retry_backoff * 2u32.pow(attempt - 1);
                    warn!(
                        document_id,
                        attempt,
                        error = %last_error,
                        "inference unavailable; retrying document in {delay:?}"
                    );
                    sleep(delay).await;
                }
            }
        };

        let confidence =
            output.stages.iter().map(|stage| stage.confidence).sum::<f64>() / Stage::ALL.len() as f64;
        let processing_time_ms = started.elapsed().as_millis() as i64;
        info!(
            document_id,
            confidence,
            processing_time_ms,
            failed_stages = output.stages.iter().filter(|s| s.is_failed()).count(),
            "document processed"
        );

        Ok(ProcessingResult {
            success: true,
            document_id,
            user_id,
            original: output.original,
            suggested: output.suggested,
            confidence,
            processing_time_ms,
            stages: output.stages,
            approval_mode,
        })
    }

    async fn run_once(
        &self,
        service: &dyn DocumentService,
        document_id: i64,
    ) -> Result<RunOutput, RunError> {
        let document = service
            .get_document(document_id)
            .await
            .map_err(RunError::DocumentService)?;
        let content = document.content.trim();
        if content.is_empty() {
            return Err(RunError::EmptyContent);
        }

        let (correspondents, document_types, tags) = tokio::try_join!(
            service.get_correspondents(),
            service.get_document_types(),
            service.get_tags(),
        )
        .map_err(RunError::DocumentService)?;

        let ctx = StageContext {
            inference: self.inference.as_ref(),
            system_prompt: &self.settings.system_prompt,
        };

        let correspondent = ctx.correspondent(content, &correspondents).await;
        let document_type = ctx.document_type(content, &document_types).await;
        let type_name = document_type.entity().map(|entity| entity.name.clone());
        let correspondent_name = correspondent.entity().map(|entity| entity.name.clone());
        let tags = ctx
            .tags(content, type_name.as_deref(), &tags, &self.settings.tagging)
            .await;
        let date = ctx.date(content).await;
        let title = ctx
            .title(
                content,
                type_name.as_deref(),
                correspondent_name.as_deref(),
                &self.settings.naming,
            )
            .await;

        let stages = vec![correspondent, document_type, tags, date, title];
        if let Some(err) = run_level_failure(&stages) {
            return Err(RunError::Inference(err));
        }

        Ok(RunOutput {
            original: OriginalMetadata::from(&document),
            suggested: self.suggest(&stages, &document),
            stages,
        })
    }

    fn suggest(&self, stages: &[StageResult], document: &Document) -> SuggestedMetadata {
        let mut suggested = SuggestedMetadata::default();

        for stage in stages {
            match stage.stage {
                Stage::Correspondent => {
                    if let Some(entity) = stage.entity() {
                        suggested.correspondent = Some(entity.name.clone());
                        suggested.correspondent_id = entity.id;
                        suggested.correspondent_is_new = entity.is_new;
                    }
                }
                Stage::DocumentType => {
                    if let Some(entity) = stage.entity() {
                        suggested.document_type = Some(entity.name.clone());
                        suggested.document_type_id = entity.id;
                        suggested.document_type_is_new = entity.is_new;
                    }
                }
                Stage::Tags => {
                    if let Some(tags) = stage.tags() {
                        suggested.tags = tags.names.clone();
                        suggested.tag_ids = tags.tag_ids.clone();
                        suggested.new_tags = tags.new_tags.clone();
                    }
                }
                Stage::Date => {
                    suggested.document_date = stage.date().map(|date| date.date.clone());
                }
                Stage::Title => {
                    suggested.title = stage.title().map(str::to_string);
                }
            }
        }

        let variables = NamingVariables {
            date: suggested.document_date.as_deref(),
            document_type: suggested.document_type.as_deref(),
            correspondent: suggested.correspondent.as_deref(),
            title: suggested.title.as_deref(),
            original: document.original_file_name.as_deref(),
        };
        suggested.filename = naming::apply_template(
            &self.settings.naming.template,
            &variables,
            self.settings.naming.clean_special_chars,
        );
        suggested
    }
}

/// A run only fails as a whole when every stage failed on the inference
/// service itself; a permanent cause wins over a transient one.
fn run_level_failure(stages: &[StageResult]) -> Option<InferenceError> {
    let causes: Vec<&InferenceError> = stages
        .iter()
        .filter_map(StageResult::inference_error)
        .collect();
    if causes.is_empty() || causes.len() < stages.len() {
        return None;
    }
    causes
        .iter()
        .find(|err| !err.is_transient())
        .or_else(|| causes.first())
        .map(|err| (*err).clone())
}
