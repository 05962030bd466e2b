use std::time::Duration;

use axum::response::sse::{Event, KeepAlive};
use futures::Stream;

use flowcast_core::frame::Frame;

/// Create an SSE response from a stream of events with keep-alive.
/// Uses a 5-second interval so proxies do not drop the connection during
/// long gaps between events.
pub fn sse_response<S>(
    stream: S,
) -> axum::response::Sse<axum::response::sse::KeepAliveStream<S>>
where
    S: Stream<Item = Result<Event, std::convert::Infallible>> + Send + 'static,
{
    axum::response::Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("keepalive"),
    )
}

/// Convert a frame into an SSE event carrying its payload as `data`.
pub fn sse_frame(frame: &Frame) -> Result<Event, std::convert::Infallible> {
    let payload = frame.payload().unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode frame payload");
        "{}".into()
    });
    Ok(Event::default().data(payload))
}
