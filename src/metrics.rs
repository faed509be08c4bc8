use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::models::{ProcessedDocument, ProcessingStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub total_documents: u64,
    pub successful_documents: u64,
    pub failed_documents: u64,
    /// Averages only cover successful documents.
    pub avg_confidence_score: Option<f64>,
    pub avg_processing_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DailyComparison {
    pub today: Option<DailyMetrics>,
    pub yesterday: Option<DailyMetrics>,
    pub documents_change: Option<i64>,
    pub documents_change_percent: Option<f64>,
    pub confidence_change: Option<f64>,
    pub processing_time_change: Option<f64>,
}

/// UTC midnight of `date` and of the following day.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::default()));
    (start, start + Duration::days(1))
}

pub fn tally_day(date: NaiveDate, documents: &[ProcessedDocument]) -> DailyMetrics {
    let (start, end) = day_bounds(date);
    let mut metrics = DailyMetrics {
        date,
        total_documents: 0,
        successful_documents: 0,
        failed_documents: 0,
        avg_confidence_score: None,
        avg_processing_time_ms: None,
    };
    let mut confidences = Vec::new();
    let mut durations = Vec::new();

    for doc in documents
        .iter()
        .filter(|doc| doc.processed_at >= start && doc.processed_at < end)
    {
        metrics.total_documents += 1;
        match doc.status {
            ProcessingStatus::Success => {
                metrics.successful_documents += 1;
                confidences.extend(doc.confidence_score);
                durations.extend(doc.processing_time_ms.map(|ms| ms as f64));
            }
            ProcessingStatus::Failed => metrics.failed_documents += 1,
            ProcessingStatus::PendingApproval | ProcessingStatus::Rejected => {}
        }
    }

    metrics.avg_confidence_score = mean(&confidences);
    metrics.avg_processing_time_ms = mean(&durations);
    metrics
}

/// One entry per day in `[start, end]` that saw any document.
pub fn daily_series(
    start: NaiveDate,
    end: NaiveDate,
    documents: &[ProcessedDocument],
) -> Vec<DailyMetrics> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| tally_day(day, documents))
        .filter(|metrics| metrics.total_documents > 0)
        .collect()
}

pub fn compare(today: DailyMetrics, yesterday: DailyMetrics) -> DailyComparison {
    let today = (today.total_documents > 0).then_some(today);
    let yesterday = (yesterday.total_documents > 0).then_some(yesterday);
    let (Some(current), Some(previous)) = (&today, &yesterday) else {
        return DailyComparison {
            today,
            yesterday,
            ..DailyComparison::default()
        };
    };

    let change = current.total_documents as i64 - previous.total_documents as i64;
    DailyComparison {
        documents_change: Some(change),
        documents_change_percent: Some(change as f64 / previous.total_documents as f64 * 100.0),
        confidence_change: difference(current.avg_confidence_score, previous.avg_confidence_score),
        processing_time_change: difference(
            current.avg_processing_time_ms,
            previous.avg_processing_time_ms,
        ),
        today,
        yesterday,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn difference(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    Some(current? - previous?)
}
