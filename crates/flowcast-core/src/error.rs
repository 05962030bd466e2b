use thiserror::Error;

/// Top-level error type for flowcast.
#[derive(Debug, Error)]
pub enum FlowcastError {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream connection failed: {0}")]
    ConnectionFailed(String),

    #[error("stream frame parse error: {0}")]
    Parse(String),

    #[error("stream interrupted: {0}")]
    Interrupted(String),

    #[error("stream timeout after {millis}ms")]
    Timeout { millis: u64 },
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("invalid dataset: timestamp of '{id}' ({timestamp}ms) precedes previous event ({previous}ms)")]
    OutOfOrder {
        id: String,
        timestamp: u64,
        previous: u64,
    },

    #[error("missing required dataset field: {0}")]
    MissingRequired(String),

    #[error("dataset not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, FlowcastError>;
