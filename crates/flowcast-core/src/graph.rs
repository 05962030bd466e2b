//! Graph state and the fold that builds it from events.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::event::{FlowEvent, NodeStatus};
use crate::log::{LogLevel, LogTrail};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub position: Position,
    pub title: String,
    pub description: String,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub animated: bool,
}

/// Overall status of a playback run, as seen by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Starting,
    Streaming,
    Stopped,
    Completed,
    Errored,
}

impl RunStatus {
    /// No more events will be folded for this run.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Errored)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Focus moved to a node. Carries the position so a view can re-center
/// without looking the node up again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusChange {
    pub node_id: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FocusUpdate {
    #[default]
    Unchanged,
    Moved(FocusChange),
    Cleared,
}

/// A log line derived from one fold step.
#[derive(Debug, Clone, PartialEq)]
pub struct LogNote {
    pub level: LogLevel,
    pub message: String,
}

impl LogNote {
    fn new(level: LogLevel, message: String) -> Self {
        Self { level, message }
    }
}

/// Side effects of folding one event, for the view layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FoldOutcome {
    pub note: Option<LogNote>,
    pub focus: FocusUpdate,
    /// Whether the graph state changed at all.
    pub changed: bool,
}

impl FoldOutcome {
    fn unchanged() -> Self {
        Self::default()
    }

    /// Append the derived note, if any, to a log trail.
    pub fn write_to(&self, trail: &mut LogTrail) {
        if let Some(note) = &self.note {
            trail.push(note.level, note.message.clone());
        }
    }
}

/// Node/edge graph built by folding events in arrival order.
///
/// Nodes keep their insertion order. Edges are append-only: a repeated edge
/// id is stored again rather than replacing the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    nodes: IndexMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    focused_node_id: Option<String>,
    run_status: RunStatus,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state by folding every event of a sequence.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a FlowEvent>) -> Self {
        let mut state = Self::new();
        for event in events {
            state.apply(event);
        }
        state
    }

    /// Pure form of [`GraphState::apply`].
    pub fn fold(mut self, event: &FlowEvent) -> (Self, FoldOutcome) {
        let outcome = self.apply(event);
        (self, outcome)
    }

    /// Fold one event into the state.
    pub fn apply(&mut self, event: &FlowEvent) -> FoldOutcome {
        match event {
            FlowEvent::NodeCreated(data) => {
                let position = Position {
                    x: data.x,
                    y: data.y,
                };
                self.nodes.insert(
                    data.id.clone(),
                    GraphNode {
                        id: data.id.clone(),
                        position,
                        title: data.title.clone(),
                        description: data.description.clone(),
                        status: data.status,
                    },
                );
                self.focused_node_id = Some(data.id.clone());
                FoldOutcome {
                    note: Some(LogNote::new(
                        LogLevel::Info,
                        format!("created node {} ({})", data.title, data.id),
                    )),
                    focus: FocusUpdate::Moved(FocusChange {
                        node_id: data.id.clone(),
                        position,
                    }),
                    changed: true,
                }
            }
            FlowEvent::NodeStatusUpdated(update) => {
                let Some(node) = self.nodes.get_mut(&update.node_id) else {
                    tracing::debug!(node_id = %update.node_id, "status update for unknown node ignored");
                    return FoldOutcome::unchanged();
                };
                node.status = update.status;
                let position = node.position;

                match update.status {
                    NodeStatus::Running => {
                        self.focused_node_id = Some(update.node_id.clone());
                        FoldOutcome {
                            note: Some(LogNote::new(
                                LogLevel::Info,
                                format!("started task {}", update.node_id),
                            )),
                            focus: FocusUpdate::Moved(FocusChange {
                                node_id: update.node_id.clone(),
                                position,
                            }),
                            changed: true,
                        }
                    }
                    NodeStatus::Success => FoldOutcome {
                        note: Some(LogNote::new(
                            LogLevel::Success,
                            format!("task complete {}", update.node_id),
                        )),
                        focus: FocusUpdate::Unchanged,
                        changed: true,
                    },
                    NodeStatus::Failed | NodeStatus::Error => FoldOutcome {
                        note: Some(LogNote::new(
                            LogLevel::Error,
                            format!("task failed {}", update.node_id),
                        )),
                        focus: FocusUpdate::Unchanged,
                        changed: true,
                    },
                    NodeStatus::Pending => FoldOutcome {
                        note: None,
                        focus: FocusUpdate::Unchanged,
                        changed: true,
                    },
                }
            }
            FlowEvent::EdgeCreated(edge) => {
                self.edges.push(GraphEdge {
                    id: edge.id.clone(),
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    animated: edge.animated,
                });
                FoldOutcome {
                    note: Some(LogNote::new(
                        LogLevel::Info,
                        format!("connected {} → {}", edge.source, edge.target),
                    )),
                    focus: FocusUpdate::Unchanged,
                    changed: true,
                }
            }
            FlowEvent::FlowCompleted(done) => {
                self.focused_node_id = None;
                self.run_status = RunStatus::Completed;
                FoldOutcome {
                    note: Some(LogNote::new(
                        LogLevel::Success,
                        format!("flow completed: {}", done.message),
                    )),
                    focus: FocusUpdate::Cleared,
                    changed: true,
                }
            }
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.keys().map(|k| k.as_str()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn focused_node_id(&self) -> Option<&str> {
        self.focused_node_id.as_deref()
    }

    /// The focused node, if it exists in the graph.
    pub fn focused_node(&self) -> Option<&GraphNode> {
        self.focused_node_id
            .as_deref()
            .and_then(|id| self.nodes.get(id))
    }

    pub fn run_status(&self) -> RunStatus {
        self.run_status
    }

    pub fn set_run_status(&mut self, status: RunStatus) {
        self.run_status = status;
    }

    pub fn clear_focus(&mut self) {
        self.focused_node_id = None;
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
