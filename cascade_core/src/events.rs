use crate::graph::NodeState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every emitted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique identifier for this event
    pub event_id: Uuid,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Notifications produced by the engine for external consumers.
///
/// The rendering layer consumes `NodeStateChanged` to animate nodes; the
/// engine makes no assumption about whether anyone is listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A node moved to a new lifecycle state
    NodeStateChanged {
        instance_id: String,
        node_id: String,
        state: NodeState,
        metadata: EventMetadata,
    },
    /// Every node completed; fired exactly once per run
    WorkflowCompleted {
        instance_id: String,
        metadata: EventMetadata,
    },
    /// The instance was returned to all-idle
    WorkflowReset {
        instance_id: String,
        metadata: EventMetadata,
    },
}

impl WorkflowEvent {
    pub fn node_state_changed(
        instance_id: impl Into<String>,
        node_id: impl Into<String>,
        state: NodeState,
    ) -> Self {
        WorkflowEvent::NodeStateChanged {
            instance_id: instance_id.into(),
            node_id: node_id.into(),
            state,
            metadata: EventMetadata::new(),
        }
    }

    pub fn workflow_completed(instance_id: impl Into<String>) -> Self {
        WorkflowEvent::WorkflowCompleted {
            instance_id: instance_id.into(),
            metadata: EventMetadata::new(),
        }
    }

    pub fn workflow_reset(instance_id: impl Into<String>) -> Self {
        WorkflowEvent::WorkflowReset {
            instance_id: instance_id.into(),
            metadata: EventMetadata::new(),
        }
    }

    pub fn instance_id(&self) -> &str {
        match self {
            WorkflowEvent::NodeStateChanged { instance_id, .. }
            | WorkflowEvent::WorkflowCompleted { instance_id, .. }
            | WorkflowEvent::WorkflowReset { instance_id, .. } => instance_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::NodeStateChanged { .. } => "node_state_changed",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow_completed",
            WorkflowEvent::WorkflowReset { .. } => "workflow_reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_ids_are_unique() {
        let a = EventMetadata::new();
        let b = EventMetadata::new();
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_event_accessors() {
        let event = WorkflowEvent::node_state_changed("inst", "A", NodeState::Processing);
        assert_eq!(event.instance_id(), "inst");
        assert_eq!(event.kind(), "node_state_changed");

        let event = WorkflowEvent::workflow_completed("inst");
        assert_eq!(event.kind(), "workflow_completed");
    }

    #[test]
    fn test_serialization_round_trip() {
        let event = WorkflowEvent::node_state_changed("inst", "A", NodeState::Completed);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"node_state_changed\""));
        assert!(json.contains("\"state\":\"completed\""));

        let back: WorkflowEvent = serde_json::from_str(&json).unwrap();
        match back {
            WorkflowEvent::NodeStateChanged { node_id, state, .. } => {
                assert_eq!(node_id, "A");
                assert_eq!(state, NodeState::Completed);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
