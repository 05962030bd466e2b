pub mod dataset;
pub mod error;
pub mod event;
pub mod fault;
pub mod frame;
pub mod graph;
pub mod log;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::dataset::Dataset;
    pub use crate::error::{FlowcastError, Result};
    pub use crate::event::{Completion, EdgeData, FlowEvent, NodeData, NodeStatus, StatusUpdate, TimedEvent};
    pub use crate::fault::{ErrorCategory, ErrorCode, ErrorDetails, FaultReport, Severity};
    pub use crate::frame::{Frame, FrameDecoder};
    pub use crate::graph::{FocusChange, FoldOutcome, GraphEdge, GraphNode, GraphState, Position, RunStatus};
    pub use crate::log::{LogEntry, LogLevel, LogTrail};
}
