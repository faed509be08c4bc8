use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let inference = state.inference.health_check().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "inference": if inference { "reachable" } else { "unreachable" },
            "queue": state.manager.state(),
        })),
    )
}
