use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::{naming, prompts};
use crate::config::{NamingConfig, TaggingConfig};
use crate::inference::{CompletionRequest, InferenceClient, InferenceError};
use crate::paperless::{find_by_name, NamedEntity, Tag};

const MISSING_TAG_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Correspondent,
    DocumentType,
    Tags,
    Date,
    Title,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Correspondent,
        Stage::DocumentType,
        Stage::Tags,
        Stage::Date,
        Stage::Title,
    ];

    pub fn temperature(&self) -> f32 {
        match self {
            Stage::Correspondent | Stage::DocumentType => 0.3,
            Stage::Tags | Stage::Title => 0.5,
            Stage::Date => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Correspondent => "correspondent",
            Stage::DocumentType => "document_type",
            Stage::Tags => "tags",
            Stage::Date => "date",
            Stage::Title => "title",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityMatch {
    pub name: String,
    pub id: Option<i64>,
    pub is_new: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagSuggestion {
    pub names: Vec<String>,
    pub tag_ids: Vec<i64>,
    pub new_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateSuggestion {
    pub date: String,
    pub date_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StageValue {
    Correspondent(EntityMatch),
    DocumentType(EntityMatch),
    Tags(TagSuggestion),
    Date(DateSuggestion),
    Title(String),
}

#[derive(Debug, Clone, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("{0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    pub value: Option<StageValue>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    cause: Option<InferenceError>,
}

impl StageResult {
    pub fn success(
        stage: Stage,
        value: Option<StageValue>,
        confidence: f64,
        reasoning: Option<String>,
    ) -> Self {
        Self {
            stage,
            value,
            confidence: clamp_confidence(confidence),
            reasoning,
            error: None,
            cause: None,
        }
    }

    pub fn failed(stage: Stage, failure: StageFailure) -> Self {
        let cause = match &failure {
            StageFailure::Inference(err) => Some(err.clone()),
            StageFailure::Malformed(_) => None,
        };
        Self {
            stage,
            value: None,
            confidence: 0.0,
            reasoning: None,
            error: Some(failure.to_string()),
            cause,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn inference_error(&self) -> Option<&InferenceError> {
        self.cause.as_ref()
    }

    pub fn entity(&self) -> Option<&EntityMatch> {
        match &self.value {
            Some(StageValue::Correspondent(entity)) | Some(StageValue::DocumentType(entity)) => {
                Some(entity)
            }
            _ => None,
        }
    }

    pub fn tags(&self) -> Option<&TagSuggestion> {
        match &self.value {
            Some(StageValue::Tags(tags)) => Some(tags),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<&DateSuggestion> {
        match &self.value {
            Some(StageValue::Date(date)) => Some(date),
            _ => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match &self.value {
            Some(StageValue::Title(title)) => Some(title),
            _ => None,
        }
    }
}

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Reads a self-reported confidence that may arrive as a number or a string.
pub fn read_confidence(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    clamp_confidence(raw)
}

fn read_text(response: &Value, key: &str) -> Option<String> {
    response
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn read_reasoning(response: &Value) -> Option<String> {
    read_text(response, "reasoning")
}

fn require_object(response: &Value) -> Result<(), StageFailure> {
    if response.is_object() {
        Ok(())
    } else {
        Err(StageFailure::Malformed(
            "model reply was not a JSON object".to_string(),
        ))
    }
}

pub struct StageContext<'a> {
    pub inference: &'a dyn InferenceClient,
    pub system_prompt: &'a str,
}

impl StageContext<'_> {
    async fn ask(&self, stage: Stage, prompt: String) -> Result<Value, StageFailure> {
        let request = CompletionRequest::new(prompt)
            .system_prompt(self.system_prompt)
            .temperature(stage.temperature());
        let response = self.inference.generate_json(&request).await?;
        require_object(&response)?;
        Ok(response)
    }

    async fn run<F>(&self, stage: Stage, prompt: String, interpret: F) -> StageResult
    where
        F: FnOnce(&Value) -> Result<StageResult, StageFailure>,
    {
        let outcome = match self.ask(stage, prompt).await {
            Ok(response) => interpret(&response),
            Err(failure) => Err(failure),
        };
        match outcome {
            Ok(result) => {
                debug!(
                    stage = stage.as_str(),
                    confidence = result.confidence,
                    "stage completed"
                );
                result
            }
            Err(failure) => {
                warn!(stage = stage.as_str(), error = %failure, "stage failed");
                StageResult::failed(stage, failure)
            }
        }
    }

    pub async fn correspondent(&self, content: &str, known: &[NamedEntity]) -> StageResult {
        let names: Vec<&str> = known.iter().map(|entity| entity.name.as_str()).collect();
        let prompt = prompts::correspondent(content, &names);
        self.run(Stage::Correspondent, prompt, |response| {
            interpret_entity(Stage::Correspondent, response, known)
        })
        .await
    }

    pub async fn document_type(&self, content: &str, known: &[NamedEntity]) -> StageResult {
        let names: Vec<&str> = known.iter().map(|entity| entity.name.as_str()).collect();
        let prompt = prompts::document_type(content, &names);
        self.run(Stage::DocumentType, prompt, |response| {
            interpret_entity(Stage::DocumentType, response, known)
        })
        .await
    }

    pub async fn tags(
        &self,
        content: &str,
        document_type: Option<&str>,
        known: &[Tag],
        rules: &TaggingConfig,
    ) -> StageResult {
        let available: Vec<&str> = known
            .iter()
            .map(|tag| tag.name.as_str())
            .filter(|name| !is_excluded(name, rules))
            .collect();
        let prompt = prompts::tags(content, document_type, &available, rules);
        self.run(Stage::Tags, prompt, |response| {
            Ok(interpret_tags(response, known, rules))
        })
        .await
    }

    pub async fn date(&self, content: &str) -> StageResult {
        self.run(Stage::Date, prompts::date(content), |response| {
            Ok(interpret_date(response))
        })
        .await
    }

    pub async fn title(
        &self,
        content: &str,
        document_type: Option<&str>,
        correspondent: Option<&str>,
        naming: &NamingConfig,
    ) -> StageResult {
        let prompt = prompts::title(
            content,
            document_type,
            correspondent,
            naming.max_title_length,
        );
        self.run(Stage::Title, prompt, |response| {
            interpret_title(response, naming)
        })
        .await
    }
}

fn entity_key(stage: Stage) -> &'static str {
    match stage {
        Stage::DocumentType => "document_type",
        _ => "correspondent",
    }
}

pub fn interpret_entity(
    stage: Stage,
    response: &Value,
    known: &[NamedEntity],
) -> Result<StageResult, StageFailure> {
    let key = entity_key(stage);
    let name = read_text(response, key)
        .ok_or_else(|| StageFailure::Malformed(format!("reply is missing `{key}`")))?;

    let entity = match find_by_name(known, &name) {
        Some(existing) => EntityMatch {
            name: existing.name.clone(),
            id: Some(existing.id),
            is_new: false,
        },
        None => EntityMatch {
            name,
            id: None,
            is_new: true,
        },
    };

    let value = match stage {
        Stage::DocumentType => StageValue::DocumentType(entity),
        _ => StageValue::Correspondent(entity),
    };

    Ok(StageResult::success(
        stage,
        Some(value),
        read_confidence(response.get("confidence")),
        read_reasoning(response),
    ))
}

fn is_excluded(name: &str, rules: &TaggingConfig) -> bool {
    rules
        .excluded_tags
        .iter()
        .any(|excluded| excluded.eq_ignore_ascii_case(name.trim()))
}

pub fn interpret_tags(response: &Value, known: &[Tag], rules: &TaggingConfig) -> StageResult {
    let names: Vec<String> = response
        .get("tags")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let confidences: Vec<Option<&Value>> = response
        .get("confidences")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(Some).collect())
        .unwrap_or_default();

    let mut scored: Vec<(String, f64)> = Vec::new();
    for (index, name) in names.into_iter().enumerate() {
        let confidence = match confidences.get(index) {
            Some(value) => read_confidence(*value),
            None => MISSING_TAG_CONFIDENCE,
        };
        if confidence < rules.confidence_threshold || is_excluded(&name, rules) {
            continue;
        }
        if scored
            .iter()
            .any(|(kept, _)| kept.eq_ignore_ascii_case(&name))
        {
            continue;
        }
        scored.push((name, confidence));
    }

    if scored.len() > rules.max_tags {
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(rules.max_tags);
    }

    let mut suggestion = TagSuggestion::default();
    for (name, _) in &scored {
        match find_by_name(known, name) {
            Some(existing) => {
                if !suggestion.tag_ids.contains(&existing.id) {
                    suggestion.tag_ids.push(existing.id);
                    suggestion.names.push(existing.name.clone());
                }
            }
            None => {
                suggestion.new_tags.push(name.clone());
                suggestion.names.push(name.clone());
            }
        }
    }

    let confidence = if scored.is_empty() {
        0.0
    } else {
        scored.iter().map(|(_, confidence)| confidence).sum::<f64>() / scored.len() as f64
    };

    StageResult::success(
        Stage::Tags,
        Some(StageValue::Tags(suggestion)),
        confidence,
        read_reasoning(response),
    )
}

pub fn interpret_date(response: &Value) -> StageResult {
    let raw = read_text(response, "document_date");
    let date_type = read_text(response, "date_type").unwrap_or_else(|| "unknown".to_string());
    let reasoning = read_reasoning(response);

    match raw.as_deref().map(naming::normalize_date) {
        Some(Some(date)) => StageResult::success(
            Stage::Date,
            Some(StageValue::Date(DateSuggestion { date, date_type })),
            read_confidence(response.get("confidence")),
            reasoning,
        ),
        Some(None) => {
            warn!(date = ?raw, "discarding date that is not YYYY-MM-DD");
            StageResult::success(Stage::Date, None, 0.0, reasoning)
        }
        None => StageResult::success(Stage::Date, None, 0.0, reasoning),
    }
}

pub fn interpret_title(
    response: &Value,
    naming_config: &NamingConfig,
) -> Result<StageResult, StageFailure> {
    let raw = read_text(response, "title")
        .ok_or_else(|| StageFailure::Malformed("reply is missing `title`".to_string()))?;

    let mut title = naming::truncate_title(&raw, naming_config.max_title_length);
    if naming_config.clean_special_chars {
        title = naming::strip_unsafe_chars(&title);
    }
    if title.is_empty() {
        return Err(StageFailure::Malformed(
            "title is empty after cleaning".to_string(),
        ));
    }

    Ok(StageResult::success(
        Stage::Title,
        Some(StageValue::Title(title)),
        read_confidence(response.get("confidence")),
        read_reasoning(response),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags_fixture() -> Vec<Tag> {
        vec![
            Tag {
                id: 1,
                name: "Finance".into(),
                color: None,
            },
            Tag {
                id: 2,
                name: "Utilities".into(),
                color: None,
            },
        ]
    }

    #[test]
    fn confidence_is_clamped_and_tolerant() {
        assert_eq!(read_confidence(Some(&json!(1.7))), 1.0);
        assert_eq!(read_confidence(Some(&json!(-0.2))), 0.0);
        assert_eq!(read_confidence(Some(&json!("0.4"))), 0.4);
        assert_eq!(read_confidence(Some(&json!("high"))), 0.0);
        assert_eq!(read_confidence(None), 0.0);
    }

    #[test]
    fn entity_matches_existing_name_case_insensitively() {
        let known = vec![NamedEntity {
            id: 7,
            name: "ACME Corp".into(),
        }];
        let result = interpret_entity(
            Stage::Correspondent,
            &json!({"correspondent": "acme corp", "confidence": 0.9}),
            &known,
        )
        .unwrap();
        let entity = result.entity().unwrap();
        assert_eq!(entity.name, "ACME Corp");
        assert_eq!(entity.id, Some(7));
        assert!(!entity.is_new);
    }

    #[test]
    fn unknown_entity_is_flagged_new() {
        let result = interpret_entity(
            Stage::DocumentType,
            &json!({"document_type": "Payslip", "confidence": 0.8}),
            &[],
        )
        .unwrap();
        let entity = result.entity().unwrap();
        assert!(entity.is_new);
        assert_eq!(entity.id, None);
    }

    #[test]
    fn missing_entity_name_is_a_failure() {
        assert!(interpret_entity(Stage::Correspondent, &json!({"confidence": 0.9}), &[]).is_err());
    }

    #[test]
    fn tags_are_filtered_ranked_and_split() {
        let rules = TaggingConfig {
            max_tags: 2,
            confidence_threshold: 0.6,
            excluded_tags: vec!["inbox".into()],
            ..TaggingConfig::default()
        };
        let response = json!({
            "tags": ["finance", "Inbox", "low", "Energy", "utilities"],
            "confidences": [0.7, 0.99, 0.3, 0.95, 0.9]
        });
        let result = interpret_tags(&response, &tags_fixture(), &rules);
        let tags = result.tags().unwrap();

        assert_eq!(tags.names, vec!["Energy", "Utilities"]);
        assert_eq!(tags.tag_ids, vec![2]);
        assert_eq!(tags.new_tags, vec!["Energy"]);
        assert!((result.confidence - 0.925).abs() < 1e-9);
    }

    #[test]
    fn missing_tag_confidences_default_to_half() {
        let rules = TaggingConfig {
            confidence_threshold: 0.5,
            ..TaggingConfig::default()
        };
        let response = json!({"tags": ["Finance", "Taxes"], "confidences": [0.9]});
        let result = interpret_tags(&response, &tags_fixture(), &rules);
        assert_eq!(result.tags().unwrap().names, vec!["Finance", "Taxes"]);
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn no_surviving_tags_means_zero_confidence() {
        let response = json!({"tags": ["x"], "confidences": [0.1]});
        let result = interpret_tags(&response, &[], &TaggingConfig::default());
        assert_eq!(result.confidence, 0.0);
        assert!(result.tags().unwrap().names.is_empty());
    }

    #[test]
    fn invalid_date_zeroes_confidence() {
        let result = interpret_date(&json!({"document_date": "2024-13-40", "confidence": 0.9}));
        assert!(result.date().is_none());
        assert_eq!(result.confidence, 0.0);

        let result = interpret_date(&json!({
            "document_date": "2024-03-15",
            "confidence": 0.8,
            "date_type": "invoice_date"
        }));
        assert_eq!(result.date().unwrap().date, "2024-03-15");
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn title_is_truncated_and_cleaned() {
        let naming = NamingConfig {
            max_title_length: 20,
            ..NamingConfig::default()
        };
        let result = interpret_title(
            &json!({"title": "Invoice: ACME Corp / March 2024 electricity", "confidence": 0.9}),
            &naming,
        )
        .unwrap();
        let title = result.title().unwrap();
        assert!(title.chars().count() <= 20);
        assert!(!title.contains(':'));
    }

    #[test]
    fn failed_stage_has_zero_confidence_and_cause() {
        let result = StageResult::failed(
            Stage::Date,
            StageFailure::Inference(InferenceError::Timeout { seconds: 1 }),
        );
        assert!(result.is_failed());
        assert_eq!(result.confidence, 0.0);
        assert!(result.inference_error().is_some());
    }
}
