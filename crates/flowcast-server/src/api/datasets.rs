use axum::extract::State;
use axum::{Json, Router, routing::get};

use flowcast_core::dataset::DatasetSummary;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/datasets", get(list_datasets))
}

async fn list_datasets(State(state): State<AppState>) -> Json<Vec<DatasetSummary>> {
    Json(state.datasets.summaries())
}
