pub mod datasets;
pub mod flow;

use axum::{Router, routing::get};

use crate::state::AppState;

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", flow::routes().merge(datasets::routes()))
        .with_state(state)
}
