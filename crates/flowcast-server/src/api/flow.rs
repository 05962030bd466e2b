use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use tokio::sync::mpsc;

use flowcast_core::dataset::DEFAULT_DATASET;
use flowcast_core::error::DatasetError;

use crate::emitter::Emitter;
use crate::error::AppError;
use crate::sse::{sse_frame, sse_response};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/flow-stream", get(flow_stream))
}

#[derive(Debug, serde::Deserialize)]
pub struct FlowStreamQuery {
    #[serde(default)]
    pub dataset: Option<String>,
}

/// Replay a dataset as an SSE stream.
///
/// The playback lives as long as the response body. When the client goes
/// away the body is dropped, which cancels the emitter.
async fn flow_stream(
    State(state): State<AppState>,
    Query(query): Query<FlowStreamQuery>,
) -> Result<impl IntoResponse, AppError> {
    let name = match query.dataset.as_deref().map(str::trim) {
        None => DEFAULT_DATASET,
        Some("") => return Err(AppError::BadRequest("dataset name must not be empty".into())),
        Some(name) => name,
    };
    let dataset = state
        .datasets
        .get(name)
        .ok_or_else(|| DatasetError::NotFound(name.to_string()))
        .map_err(|e| AppError::Flowcast(e.into()))?;

    let guard = state.playbacks.register();
    let playback_id = guard.id();
    tracing::info!(%playback_id, dataset = dataset.name(), events = dataset.len(), "playback started");

    let (tx, mut rx) = mpsc::channel(state.config.frame_buffer.max(1));
    let emitter = Emitter::new(dataset, state.config.emitter_options());
    let cancel = guard.cancel_flag();
    tokio::spawn(async move {
        let outcome = emitter.run(tx, cancel).await;
        if outcome.is_fault() {
            tracing::warn!(%playback_id, ?outcome, "playback ended with fault");
        } else {
            tracing::info!(%playback_id, ?outcome, "playback finished");
        }
    });

    let stream = async_stream::stream! {
        // Dropping the body drops the guard, which cancels the playback.
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            yield sse_frame(&frame);
        }
    };

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse_response(stream),
    ))
}
