//! Fault taxonomy used to decide retry eligibility and what to tell the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DatasetError, FlowcastError, StreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Stream,
    Validation,
    Runtime,
    Unknown,
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NetworkConnectionFailed,
    NetworkTimeout,
    NetworkCors,
    StreamConnectionFailed,
    StreamParse,
    StreamInterrupted,
    StreamTimeout,
    ValidationInvalidData,
    ValidationMissingRequired,
    RuntimeUnexpected,
    RuntimeResourceExhausted,
    Unknown,
}

/// Static handling profile of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeProfile {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub user_message: &'static str,
    pub retryable: bool,
    pub max_retries: u32,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 12] = [
        Self::NetworkConnectionFailed,
        Self::NetworkTimeout,
        Self::NetworkCors,
        Self::StreamConnectionFailed,
        Self::StreamParse,
        Self::StreamInterrupted,
        Self::StreamTimeout,
        Self::ValidationInvalidData,
        Self::ValidationMissingRequired,
        Self::RuntimeUnexpected,
        Self::RuntimeResourceExhausted,
        Self::Unknown,
    ];

    pub const fn profile(self) -> CodeProfile {
        use ErrorCategory as C;
        use Severity as S;
        let (category, severity, user_message, retryable, max_retries) = match self {
            Self::NetworkConnectionFailed => (
                C::Network,
                S::High,
                "Network connection failed, please check your network settings",
                true,
                3,
            ),
            Self::NetworkTimeout => (
                C::Network,
                S::Medium,
                "The network request timed out, please try again later",
                true,
                2,
            ),
            Self::NetworkCors => (
                C::Network,
                S::High,
                "Cross-origin request rejected, please contact the administrator",
                false,
                0,
            ),
            Self::StreamConnectionFailed => (
                C::Stream,
                S::High,
                "Stream connection failed, please reload and try again",
                true,
                3,
            ),
            Self::StreamParse => (
                C::Stream,
                S::Medium,
                "Received data could not be parsed, please try again",
                true,
                2,
            ),
            Self::StreamInterrupted => (
                C::Stream,
                S::Medium,
                "The stream was interrupted, reconnecting",
                true,
                5,
            ),
            Self::StreamTimeout => (
                C::Stream,
                S::Medium,
                "The stream timed out, please try again",
                true,
                2,
            ),
            Self::ValidationInvalidData => (C::Validation, S::Low, "Invalid data format", false, 0),
            Self::ValidationMissingRequired => (
                C::Validation,
                S::Medium,
                "A required value is missing",
                false,
                0,
            ),
            Self::RuntimeUnexpected => (
                C::Runtime,
                S::Critical,
                "An unexpected error occurred, please reload",
                false,
                0,
            ),
            Self::RuntimeResourceExhausted => (
                C::Runtime,
                S::Critical,
                "Out of resources, close other applications and try again",
                false,
                0,
            ),
            Self::Unknown => (
                C::Unknown,
                S::High,
                "An unknown error occurred, please try again",
                true,
                1,
            ),
        };
        CodeProfile {
            category,
            severity,
            user_message,
            retryable,
            max_retries,
        }
    }

    pub fn category(self) -> ErrorCategory {
        self.profile().category
    }

    pub fn severity(self) -> Severity {
        self.profile().severity
    }

    pub fn retryable(self) -> bool {
        self.profile().retryable
    }

    pub fn max_retries(self) -> u32 {
        self.profile().max_retries
    }

    /// Classify a typed error.
    pub fn classify(err: &FlowcastError) -> Self {
        match err {
            FlowcastError::Stream(stream) => match stream {
                StreamError::ConnectionFailed(_) => Self::StreamConnectionFailed,
                StreamError::Parse(_) => Self::StreamParse,
                StreamError::Interrupted(_) => Self::StreamInterrupted,
                StreamError::Timeout { .. } => Self::StreamTimeout,
            },
            FlowcastError::Dataset(dataset) => match dataset {
                DatasetError::MissingRequired(_) => Self::ValidationMissingRequired,
                DatasetError::OutOfOrder { .. } | DatasetError::NotFound(_) => {
                    Self::ValidationInvalidData
                }
            },
            FlowcastError::Network(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("timeout") || lower.contains("timed out") {
                    Self::NetworkTimeout
                } else if lower.contains("cors") || lower.contains("cross-origin") {
                    Self::NetworkCors
                } else {
                    Self::NetworkConnectionFailed
                }
            }
            FlowcastError::Serialization(_) => Self::ValidationInvalidData,
            FlowcastError::Io(io) => match io.kind() {
                std::io::ErrorKind::OutOfMemory => Self::RuntimeResourceExhausted,
                std::io::ErrorKind::TimedOut => Self::NetworkTimeout,
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::NotConnected => Self::NetworkConnectionFailed,
                _ => Self::RuntimeUnexpected,
            },
            FlowcastError::Other(msg) => Self::classify_message(msg),
        }
    }

    /// Keyword classification for errors that only carry a message.
    ///
    /// Checked in order: network, stream, validation, runtime.
    pub fn classify_message(message: &str) -> Self {
        let m = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| m.contains(n));

        if has(&["fetch", "network"]) {
            if has(&["timeout", "timed out"]) {
                return Self::NetworkTimeout;
            }
            if has(&["cors", "cross-origin"]) {
                return Self::NetworkCors;
            }
            return Self::NetworkConnectionFailed;
        }
        if has(&["stream", "eventsource"]) {
            if has(&["parse", "json"]) {
                return Self::StreamParse;
            }
            if has(&["interrupt", "close"]) {
                return Self::StreamInterrupted;
            }
            if has(&["timeout"]) {
                return Self::StreamTimeout;
            }
            return Self::StreamConnectionFailed;
        }
        if has(&["validation", "invalid"]) {
            if has(&["required", "missing"]) {
                return Self::ValidationMissingRequired;
            }
            return Self::ValidationInvalidData;
        }
        if has(&["memory"]) {
            return Self::RuntimeResourceExhausted;
        }
        if has(&["unexpected", "panic"]) {
            return Self::RuntimeUnexpected;
        }
        Self::Unknown
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NetworkConnectionFailed => "NETWORK_CONNECTION_FAILED",
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::NetworkCors => "NETWORK_CORS",
            Self::StreamConnectionFailed => "STREAM_CONNECTION_FAILED",
            Self::StreamParse => "STREAM_PARSE",
            Self::StreamInterrupted => "STREAM_INTERRUPTED",
            Self::StreamTimeout => "STREAM_TIMEOUT",
            Self::ValidationInvalidData => "VALIDATION_INVALID_DATA",
            Self::ValidationMissingRequired => "VALIDATION_MISSING_REQUIRED",
            Self::RuntimeUnexpected => "RUNTIME_UNEXPECTED",
            Self::RuntimeResourceExhausted => "RUNTIME_RESOURCE_EXHAUSTED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// A remediation step offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub action: String,
    pub description: String,
    pub priority: Priority,
}

impl Suggestion {
    fn new(action: &str, description: &str, priority: Priority) -> Self {
        Self {
            action: action.into(),
            description: description.into(),
            priority,
        }
    }
}

/// A classified fault with its handling metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
    pub user_message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    pub retryable: bool,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl ErrorDetails {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let profile = code.profile();
        Self {
            code,
            category: profile.category,
            severity: profile.severity,
            message: message.into(),
            user_message: profile.user_message.to_string(),
            timestamp: Utc::now(),
            context: Map::new(),
            retryable: profile.retryable,
            retry_count: 0,
            max_retries: profile.max_retries,
        }
    }

    pub fn from_error(err: &FlowcastError) -> Self {
        Self::new(ErrorCode::classify(err), err.to_string())
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Faults of medium severity or worse are shown to the user.
    pub fn should_show_user(&self) -> bool {
        self.severity >= Severity::Medium
    }

    pub fn should_retry(&self) -> bool {
        self.retryable && self.retry_count < self.max_retries
    }

    /// `[CODE] message | Context: {...} | Retry: n/max`
    pub fn format_for_log(&self) -> String {
        let mut parts = vec![format!("[{}]", self.code), self.message.clone()];
        if !self.context.is_empty() {
            let context = serde_json::to_string(&self.context).unwrap_or_else(|_| "{}".into());
            parts.push(format!("Context: {context}"));
        }
        parts.push(format!("Retry: {}/{}", self.retry_count, self.max_retries));
        parts.join(" | ")
    }

    /// Ordered remediation steps. Most codes have none.
    pub fn suggestions(&self) -> Vec<Suggestion> {
        match self.code {
            ErrorCode::NetworkConnectionFailed => vec![
                Suggestion::new(
                    "Check connection",
                    "Make sure the device is connected to the network",
                    Priority::High,
                ),
                Suggestion::new(
                    "Reload",
                    "Reload to establish a new connection",
                    Priority::Medium,
                ),
            ],
            ErrorCode::StreamConnectionFailed => vec![
                Suggestion::new("Reload", "Re-establish the stream connection", Priority::High),
                Suggestion::new(
                    "Check client settings",
                    "Make sure server-sent events are allowed",
                    Priority::Medium,
                ),
            ],
            ErrorCode::RuntimeResourceExhausted => vec![
                Suggestion::new("Close other applications", "Free system memory", Priority::High),
                Suggestion::new("Restart the client", "Release cached resources", Priority::Medium),
            ],
            ErrorCode::Unknown => vec![
                Suggestion::new("Reload", "Reinitialize the application state", Priority::High),
                Suggestion::new(
                    "Contact support",
                    "If the problem persists, contact support",
                    Priority::Low,
                ),
            ],
            _ => Vec::new(),
        }
    }
}

/// What the consumer surfaces when a session ends in a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultReport {
    pub details: ErrorDetails,
    pub suggestions: Vec<Suggestion>,
}

impl From<ErrorDetails> for FaultReport {
    fn from(details: ErrorDetails) -> Self {
        let suggestions = details.suggestions();
        Self {
            details,
            suggestions,
        }
    }
}
