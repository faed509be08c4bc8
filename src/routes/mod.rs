use std::str::FromStr;

use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::{auth::AuthenticatedUser, state::AppState};

pub mod approvals;
pub mod documents;
pub mod health;
pub mod metrics;
pub mod models;
pub mod queue;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let queue_routes = Router::new()
        .route("/stats", get(queue::queue_stats))
        .route("/items", get(queue::list_items))
        .route("/pause", post(queue::pause))
        .route("/resume", post(queue::resume))
        .route("/completed", delete(queue::clear_finished))
        .route("/process-now", post(queue::process_now))
        .route("/retry-failed", post(queue::retry_failed));

    let documents_routes = Router::new()
        .route("/", get(documents::list_documents))
        .route("/stats", get(documents::document_stats))
        .route("/:paperless_id/reprocess", post(documents::reprocess_document));

    let approvals_routes = Router::new()
        .route("/", get(approvals::list_approvals))
        .route("/:id/approve", post(approvals::approve))
        .route("/:id/reject", post(approvals::reject));

    let metrics_routes = Router::new()
        .route("/daily", get(metrics::daily_comparison))
        .route("/daily/:date", get(metrics::metrics_for_date))
        .route("/range", get(metrics::metrics_range));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/queue", queue_routes)
        .nest("/api/documents", documents_routes)
        .nest("/api/approvals", approvals_routes)
        .nest("/api/metrics", metrics_routes)
        .route("/api/models", get(models::list_models))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Parses an optional `?status=` filter.
pub(crate) fn status_filter<T>(raw: Option<&str>) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|err: T::Err| AppError::bad_request(err.to_string())),
        None => Ok(None),
    }
}
