//! Client side of flowcast: opens the event stream, folds events into graph
//! state and keeps the log trail a view renders.

pub mod config;
pub mod consumer;
pub mod retry;
pub mod transport;

pub use config::ConsumerConfig;
pub use consumer::{CloseReason, ConnectionState, ConsumerSnapshot, FlowConsumer, Session, SessionEnd};
pub use retry::{RetryDecision, RetryPolicy};
pub use transport::{FrameSource, HttpFrameSource, PayloadStream};
