use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use flowcast_core::error::{DatasetError, FlowcastError};

/// Application error type that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Flowcast(FlowcastError),
}

impl From<FlowcastError> for AppError {
    fn from(err: FlowcastError) -> Self {
        AppError::Flowcast(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Flowcast(FlowcastError::Dataset(DatasetError::NotFound(name))) => {
                (StatusCode::NOT_FOUND, format!("unknown dataset: {name}"))
            }
            AppError::Flowcast(FlowcastError::Dataset(err)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            AppError::Flowcast(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
