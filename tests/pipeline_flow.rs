mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{
    document, FakeDocumentService, FakeInference, PromptKind, Reply, ACME_DOCUMENT_ID,
};
use docpilot::config::NamingConfig;
use docpilot::inference::{InferenceClient, InferenceError};
use docpilot::paperless::PaperlessError;
use docpilot::pipeline::stages::Stage;
use docpilot::pipeline::{DocumentProcessor, PipelineSettings, ProcessingError};
use serde_json::json;
use uuid::Uuid;

fn processor(inference: Arc<FakeInference>, settings: PipelineSettings) -> DocumentProcessor {
    let inference: Arc<dyn InferenceClient> = inference;
    DocumentProcessor::new(inference, settings)
}

#[tokio::test]
async fn acme_invoice_reuses_existing_entities() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    let service = FakeDocumentService::acme().await;
    let processor = processor(inference.clone(), PipelineSettings::default());

    let result = processor
        .process_document(&service, ACME_DOCUMENT_ID, Uuid::new_v4(), None, 3)
        .await?;

    assert!(result.success);
    assert_eq!(result.document_id, ACME_DOCUMENT_ID);
    assert_eq!(result.suggested.correspondent.as_deref(), Some("ACME Corp"));
    assert_eq!(result.suggested.correspondent_id, Some(1));
    assert!(!result.suggested.correspondent_is_new);
    assert_eq!(result.suggested.document_type.as_deref(), Some("Invoice"));
    assert_eq!(result.suggested.document_type_id, Some(2));
    assert_eq!(result.suggested.tags, vec!["Finance", "Invoices"]);
    assert_eq!(result.suggested.tag_ids, vec![3]);
    assert_eq!(result.suggested.new_tags, vec!["Invoices"]);
    assert_eq!(result.suggested.document_date.as_deref(), Some("2024-03-15"));
    let title = result.suggested.title.clone().unwrap_or_default();
    assert!(!title.is_empty());
    assert!(title.chars().count() <= NamingConfig::default().max_title_length);
    assert_eq!(
        result.suggested.filename,
        "2024-03-15_ACME_Corp_Invoice_ACME_Corp_Invoice_1001"
    );

    assert_eq!(result.stages.len(), Stage::ALL.len());
    let expected = (0.92 + 0.88 + 0.85 + 0.85 + 0.8) / 5.0;
    assert!((result.confidence - expected).abs() < 1e-9);
    assert_eq!(inference.calls(), 5);
    Ok(())
}

#[tokio::test]
async fn empty_ocr_fails_fast_without_model_calls() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    let service = FakeDocumentService::acme().await;
    service.insert_document(document(77, "   \n  ", vec![])).await;
    let processor = processor(inference.clone(), PipelineSettings::default());

    let err = processor
        .process_document(&service, 77, Uuid::new_v4(), None, 3)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessingError::EmptyContent { document_id: 77 }));
    assert_eq!(inference.calls(), 0);
    assert_eq!(service.get_document_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn impossible_dates_are_discarded_with_zero_confidence() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    inference
        .set_default(
            PromptKind::Date,
            json!({"document_date": "2024-13-40", "confidence": 0.9}),
        )
        .await;
    let service = FakeDocumentService::acme().await;
    let processor = processor(inference.clone(), PipelineSettings::default());

    let result = processor
        .process_document(&service, ACME_DOCUMENT_ID, Uuid::new_v4(), None, 3)
        .await?;

    assert_eq!(result.suggested.document_date, None);
    let date_stage = result
        .stages
        .iter()
        .find(|stage| stage.stage == Stage::Date)
        .expect("date stage present");
    assert_eq!(date_stage.confidence, 0.0);
    assert!(!result.suggested.filename.contains("2024-13-40"));
    Ok(())
}

#[tokio::test]
async fn overlong_titles_are_truncated_to_the_limit() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    inference
        .set_default(
            PromptKind::Title,
            json!({"title": "Quarterly statement ".repeat(10), "confidence": 0.7}),
        )
        .await;
    let service = FakeDocumentService::acme().await;
    let settings = PipelineSettings {
        naming: NamingConfig {
            max_title_length: 30,
            ..NamingConfig::default()
        },
        ..PipelineSettings::default()
    };
    let processor = processor(inference, settings);

    let result = processor
        .process_document(&service, ACME_DOCUMENT_ID, Uuid::new_v4(), None, 3)
        .await?;

    let title = result.suggested.title.unwrap_or_default();
    assert!(title.chars().count() <= 30);
    assert!(title.ends_with("..."));
    Ok(())
}

#[tokio::test]
async fn one_invalid_json_reply_is_corrected_once() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    inference
        .push(
            PromptKind::Correspondent,
            Reply::Text("Sure! The sender is ACME.".into()),
        )
        .await;
    let service = FakeDocumentService::acme().await;
    let processor = processor(inference.clone(), PipelineSettings::default());

    let result = processor
        .process_document(&service, ACME_DOCUMENT_ID, Uuid::new_v4(), None, 3)
        .await?;

    assert_eq!(result.suggested.correspondent_id, Some(1));
    assert_eq!(inference.calls(), 6);
    let prompts = inference.prompts().await;
    assert!(prompts[1].contains("previous response was not valid JSON"));
    Ok(())
}

#[tokio::test]
async fn a_failing_stage_does_not_abort_its_siblings() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    inference
        .push(
            PromptKind::Tags,
            Reply::Fail(InferenceError::ModelNotFound {
                model: "llama3.2".into(),
                available: vec![],
            }),
        )
        .await;
    let service = FakeDocumentService::acme().await;
    let processor = processor(inference, PipelineSettings::default());

    let result = processor
        .process_document(&service, ACME_DOCUMENT_ID, Uuid::new_v4(), None, 3)
        .await?;

    let tags = result
        .stages
        .iter()
        .find(|stage| stage.stage == Stage::Tags)
        .expect("tags stage present");
    assert!(tags.is_failed());
    assert_eq!(tags.confidence, 0.0);
    assert!(result.suggested.tags.is_empty());
    assert_eq!(result.suggested.correspondent_id, Some(1));
    assert_eq!(result.suggested.document_date.as_deref(), Some("2024-03-15"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_outages_retry_the_whole_run() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    inference
        .fail_next(5, InferenceError::Timeout { seconds: 120 })
        .await;
    let service = FakeDocumentService::acme().await;
    let processor = processor(inference.clone(), PipelineSettings::default());

    let result = processor
        .process_document(&service, ACME_DOCUMENT_ID, Uuid::new_v4(), None, 3)
        .await?;

    assert_eq!(result.suggested.correspondent_id, Some(1));
    assert_eq!(inference.calls(), 10);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_the_last_error() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    inference
        .fail_always(InferenceError::Connection {
            base_url: "http://localhost:11434".into(),
        })
        .await;
    let service = FakeDocumentService::acme().await;
    let settings = PipelineSettings {
        retry_backoff: Duration::from_secs(2),
        ..PipelineSettings::default()
    };
    let processor = processor(inference.clone(), settings);

    let started = tokio::time::Instant::now();
    let err = processor
        .process_document(&service, ACME_DOCUMENT_ID, Uuid::new_v4(), None, 3)
        .await
        .unwrap_err();

    match err {
        ProcessingError::RetriesExhausted {
            document_id,
            attempts,
            last_error,
        } => {
            assert_eq!(document_id, ACME_DOCUMENT_ID);
            assert_eq!(attempts, 3);
            assert!(matches!(last_error, InferenceError::Connection { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(inference.calls(), 15);
    // 2s after the first attempt, 4s after the second.
    assert!(started.elapsed() >= Duration::from_secs(6));
    Ok(())
}

#[tokio::test]
async fn permanent_inference_failure_is_not_retried() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    inference
        .fail_always(InferenceError::ModelNotFound {
            model: "llama3.2".into(),
            available: vec!["mistral:latest".into()],
        })
        .await;
    let service = FakeDocumentService::acme().await;
    let processor = processor(inference.clone(), PipelineSettings::default());

    let err = processor
        .process_document(&service, ACME_DOCUMENT_ID, Uuid::new_v4(), None, 3)
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessingError::Inference { .. }));
    assert_eq!(inference.calls(), 5);
    Ok(())
}

#[tokio::test]
async fn document_service_errors_are_raised_immediately() -> Result<()> {
    let inference = Arc::new(FakeInference::acme());
    let service = FakeDocumentService::acme().await;
    service
        .fail_get_document(PaperlessError::Auth {
            status: 401,
            message: "Invalid token.".into(),
        })
        .await;
    let processor = processor(inference.clone(), PipelineSettings::default());

    let err = processor
        .process_document(&service, ACME_DOCUMENT_ID, Uuid::new_v4(), None, 3)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProcessingError::DocumentService {
            document_id: ACME_DOCUMENT_ID,
            source: PaperlessError::Auth { status: 401, .. }
        }
    ));
    assert_eq!(service.get_document_calls(), 1);
    assert_eq!(inference.calls(), 0);
    Ok(())
}
