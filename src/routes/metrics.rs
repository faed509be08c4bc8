use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::metrics::{self, DailyComparison, DailyMetrics};
use crate::state::AppState;

const DEFAULT_RANGE_DAYS: i64 = 7;
const MAX_RANGE_DAYS: i64 = 366;

#[derive(Deserialize)]
pub struct RangeQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct MetricsRange {
    pub metrics: Vec<DailyMetrics>,
    pub total_days: i64,
}

pub async fn daily_comparison(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DailyComparison>> {
    let today = Utc::now().date_naive();
    let yesterday = today - Duration::days(1);
    let (from, _) = metrics::day_bounds(yesterday);
    let (_, to) = metrics::day_bounds(today);
    let documents = state.repo.processed_between(user.user_id, from, to).await?;

    Ok(Json(metrics::compare(
        metrics::tally_day(today, &documents),
        metrics::tally_day(yesterday, &documents),
    )))
}

pub async fn metrics_for_date(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(date): Path<NaiveDate>,
) -> AppResult<Json<Option<DailyMetrics>>> {
    let (from, to) = metrics::day_bounds(date);
    let documents = state.repo.processed_between(user.user_id, from, to).await?;
    let day = metrics::tally_day(date, &documents);
    Ok(Json((day.total_documents > 0).then_some(day)))
}

/// Reversed bounds are swapped; missing bounds default to the last week.
pub async fn metrics_range(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<MetricsRange>> {
    let today = Utc::now().date_naive();
    let end = query.end.unwrap_or(today);
    let start = query
        .start
        .unwrap_or(end - Duration::days(DEFAULT_RANGE_DAYS - 1));
    let (start, end) = if end < start { (end, start) } else { (start, end) };

    let total_days = (end - start).num_days() + 1;
    if total_days > MAX_RANGE_DAYS {
        return Err(AppError::bad_request(format!(
            "date range may span at most {MAX_RANGE_DAYS} days"
        )));
    }

    let (from, _) = metrics::day_bounds(start);
    let (_, to) = metrics::day_bounds(end);
    let documents = state.repo.processed_between(user.user_id, from, to).await?;
    Ok(Json(MetricsRange {
        metrics: metrics::daily_series(start, end, &documents),
        total_days,
    }))
}
