pub mod api;
pub mod config;
pub mod emitter;
pub mod error;
pub mod sse;
pub mod state;

use axum::Router;
use axum::http::{Method, header};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CACHE_CONTROL]);

    api::api_routes(state).layer(cors)
}
