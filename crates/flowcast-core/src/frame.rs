//! Text framing for the push channel.
//!
//! Each frame is written as `data: <payload>\n\n`. Two payloads are
//! sentinels: [`CONNECTED_PAYLOAD`] opens a stream and [`DONE_PAYLOAD`]
//! terminates it. Everything else is a JSON-encoded [`TimedEvent`].

use crate::error::{Result, StreamError};
use crate::event::TimedEvent;

/// Connection acknowledgement, written once when the stream opens.
pub const CONNECTED_PAYLOAD: &str = r#"{"type":"connected"}"#;

/// Terminal marker, written once after the last event.
pub const DONE_PAYLOAD: &str = "[DONE]";

/// One unit written to or read from the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Connected,
    Event(TimedEvent),
    Done,
}

impl Frame {
    /// Classify a payload received from the channel.
    ///
    /// Sentinels never fail. A non-sentinel payload that is not a valid
    /// event yields [`StreamError::Parse`].
    pub fn parse(payload: &str) -> Result<Self> {
        let trimmed = payload.trim();
        if trimmed == DONE_PAYLOAD {
            return Ok(Self::Done);
        }
        if is_connected_payload(trimmed) {
            return Ok(Self::Connected);
        }
        serde_json::from_str::<TimedEvent>(trimmed)
            .map(Self::Event)
            .map_err(|e| StreamError::Parse(format!("{e}: {}", truncate(trimmed, 120))).into())
    }

    /// The payload text carried by this frame.
    pub fn payload(&self) -> Result<String> {
        match self {
            Self::Connected => Ok(CONNECTED_PAYLOAD.to_string()),
            Self::Done => Ok(DONE_PAYLOAD.to_string()),
            Self::Event(event) => event.to_json(),
        }
    }

    /// The full wire representation, including the `data: ` prefix and the
    /// blank-line terminator.
    pub fn encode(&self) -> Result<String> {
        Ok(format!("data: {}\n\n", self.payload()?))
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Self::Event(_))
    }
}

fn is_connected_payload(payload: &str) -> bool {
    if payload == CONNECTED_PAYLOAD {
        return true;
    }
    // Tolerate the same object with different whitespace or key spacing.
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(map)) => {
            map.len() == 1 && map.get("type").and_then(|t| t.as_str()) == Some("connected")
        }
        _ => false,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Incremental decoder turning raw channel bytes into frame payloads.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across chunks decode correctly. Comment lines (`:`) and
/// non-`data` fields are ignored. Consecutive `data` lines of one frame are
/// joined with `\n`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every payload completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(payload) = self.feed_line(line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing payload when the channel ends without a final blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            self.feed_line(line);
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data).join("\n"))
        }
    }
}
