use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ModelList {
    pub models: Vec<String>,
}

pub async fn list_models(State(state): State<AppState>) -> AppResult<Json<ModelList>> {
    let models = state.inference.list_models().await?;
    Ok(Json(ModelList { models }))
}
