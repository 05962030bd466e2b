use serde::{Deserialize, Serialize};

/// Lifecycle of a graph node.
///
/// `Failed` and `Error` are both accepted on the wire. They render and fold
/// identically; see [`NodeStatus::is_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
    #[serde(rename = "ERROR", alias = "error")]
    Error,
}

impl NodeStatus {
    /// Terminal failure, regardless of which literal produced it.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Error)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Payload of a `node_created` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: NodeStatus,
    pub x: f64,
    pub y: f64,
}

/// Payload of a `node_status_updated` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub node_id: String,
    pub status: NodeStatus,
}

/// Payload of an `edge_created` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub animated: bool,
}

/// Payload of a `flow_completed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub message: String,
}

/// A domain event carried by one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FlowEvent {
    NodeCreated(NodeData),
    NodeStatusUpdated(StatusUpdate),
    EdgeCreated(EdgeData),
    FlowCompleted(Completion),
}

impl FlowEvent {
    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeCreated(_) => "node_created",
            Self::NodeStatusUpdated(_) => "node_status_updated",
            Self::EdgeCreated(_) => "edge_created",
            Self::FlowCompleted(_) => "flow_completed",
        }
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, Self::FlowCompleted(_))
    }

    pub fn node_created(
        id: impl Into<String>,
        title: impl Into<String>,
        status: NodeStatus,
        x: f64,
        y: f64,
    ) -> Self {
        Self::NodeCreated(NodeData {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status,
            x,
            y,
        })
    }

    pub fn status_updated(node_id: impl Into<String>, status: NodeStatus) -> Self {
        Self::NodeStatusUpdated(StatusUpdate {
            node_id: node_id.into(),
            status,
        })
    }

    pub fn edge_created(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::EdgeCreated(EdgeData {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            animated: true,
        })
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self::FlowCompleted(Completion {
            message: message.into(),
        })
    }
}

/// An event as it appears in a dataset and on the wire.
///
/// `timestamp` is the offset in milliseconds from stream start. Only the
/// emitter reads it; the reducer ignores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(flatten)]
    pub event: FlowEvent,
}

impl TimedEvent {
    pub fn new(id: impl Into<String>, timestamp: u64, event: FlowEvent) -> Self {
        Self {
            id: id.into(),
            timestamp,
            event,
        }
    }

    /// Parse a frame payload into an event.
    pub fn from_json(payload: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_status_wire_literals() {
        assert_eq!(serde_json::to_string(&NodeStatus::Running).unwrap(), "\"running\"");
        assert_eq!(serde_json::to_string(&NodeStatus::Error).unwrap(), "\"ERROR\"");
        let parsed: NodeStatus = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(parsed, NodeStatus::Error);
        let parsed: NodeStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, NodeStatus::Error);
        assert!(serde_json::from_str::<NodeStatus>("\"done\"").is_err());
    }

    #[test]
    fn failure_is_unified() {
        assert!(NodeStatus::Failed.is_failure());
        assert!(NodeStatus::Error.is_failure());
        assert!(!NodeStatus::Success.is_failure());
        assert!(NodeStatus::Success.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
    }

    #[test]
    fn parse_node_created_envelope() {
        let payload = json!({
            "id": "init",
            "type": "node_created",
            "timestamp": 0,
            "data": {
                "id": "init-node",
                "title": "Model loaded",
                "description": "ready",
                "status": "success",
                "x": 100,
                "y": 300
            }
        })
        .to_string();

        let event = TimedEvent::from_json(&payload).unwrap();
        assert_eq!(event.id, "init");
        assert_eq!(event.timestamp, 0);
        match event.event {
            FlowEvent::NodeCreated(data) => {
                assert_eq!(data.id, "init-node");
                assert_eq!(data.status, NodeStatus::Success);
                assert_eq!(data.x, 100.0);
                assert_eq!(data.y, 300.0);
            }
            other => panic!("Expected NodeCreated, got {other:?}"),
        }
    }

    #[test]
    fn parse_status_update_uses_camel_case() {
        let payload = r#"{"type":"node_status_updated","timestamp":1500,"data":{"nodeId":"session-node","status":"running"}}"#;
        let event = TimedEvent::from_json(payload).unwrap();
        assert_eq!(
            event.event,
            FlowEvent::status_updated("session-node", NodeStatus::Running)
        );
        assert_eq!(event.id, "");
    }

    #[test]
    fn parse_edge_without_animated_flag() {
        let payload = r#"{"type":"edge_created","data":{"id":"e1","source":"a","target":"b"}}"#;
        let event = TimedEvent::from_json(payload).unwrap();
        match event.event {
            FlowEvent::EdgeCreated(edge) => assert!(!edge.animated),
            other => panic!("Expected EdgeCreated, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let payload = r#"{"type":"node_deleted","data":{"id":"a"}}"#;
        assert!(TimedEvent::from_json(payload).is_err());
    }

    #[test]
    fn serialized_envelope_shape() {
        let event = TimedEvent::new("done", 800, FlowEvent::completed("all good"));
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "flow_completed");
        assert_eq!(value["timestamp"], 800);
        assert_eq!(value["data"]["message"], "all good");
        assert_eq!(value["id"], "done");
    }

    #[test]
    fn event_kind_matches_tag() {
        assert_eq!(FlowEvent::edge_created("e", "a", "b").kind(), "edge_created");
        assert!(FlowEvent::completed("x").is_completion());
    }
}
