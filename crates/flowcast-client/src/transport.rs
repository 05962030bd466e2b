//! Push-channel establishment.
//!
//! A [`FrameSource`] opens one channel per session and yields the raw frame
//! payloads in arrival order. The consumer does the parsing, so a source only
//! deals with bytes and framing.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use flowcast_core::error::{FlowcastError, Result, StreamError};
use flowcast_core::frame::FrameDecoder;

/// Ordered frame payloads of one open channel. An `Err` item is a
/// channel-level fault and ends the stream.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Open a new channel. Dropping the returned stream closes it.
    async fn open(&self) -> Result<PayloadStream>;
}

/// Reads an SSE endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFrameSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFrameSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn open(&self) -> Result<PayloadStream> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(StreamError::ConnectionFailed(format!("HTTP {status}: {body}")).into());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("text/event-stream") {
            return Err(StreamError::ConnectionFailed(format!(
                "unexpected content type '{content_type}'"
            ))
            .into());
        }

        tracing::debug!(url = %self.url, "stream channel open");
        Ok(Box::pin(payload_stream(response)))
    }
}

/// Split a streaming response body into frame payloads.
fn payload_stream(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        let mut byte_stream = Box::pin(response.bytes_stream());

        while let Some(result) = byte_stream.next().await {
            let chunk = match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(body_error(e));
                    return;
                }
            };
            for payload in decoder.push(&chunk) {
                yield Ok(payload);
            }
        }

        if let Some(payload) = decoder.finish() {
            yield Ok(payload);
        }
    }
}

fn request_error(err: reqwest::Error) -> FlowcastError {
    if err.is_timeout() {
        FlowcastError::Network(format!("request timed out: {err}"))
    } else if err.is_connect() {
        FlowcastError::Network(format!("connection failed: {err}"))
    } else {
        StreamError::ConnectionFailed(err.to_string()).into()
    }
}

fn body_error(err: reqwest::Error) -> FlowcastError {
    if err.is_timeout() {
        FlowcastError::Network(format!("read timed out: {err}"))
    } else {
        StreamError::Interrupted(err.to_string()).into()
    }
}
