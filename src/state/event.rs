// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Events: the immutable facts the state is folded from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{AgentId, AgentRole, AgentStatus, Complexity, Priority, TaskId, TaskType};

/// An appended event. `seq` is assigned by the log under its append lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,
    /// Never earlier than the previous event's timestamp.
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// Type-specific event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    AgentRegistered {
        agent_id: AgentId,
        role: AgentRole,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pane: Option<String>,
    },
    AgentStatusChanged {
        agent_id: AgentId,
        status: AgentStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    TaskCreated {
        task_id: TaskId,
        description: String,
        task_type: TaskType,
        priority: Priority,
        complexity: Complexity,
        #[serde(default)]
        tags: Vec<String>,
    },
    TaskAssigned {
        task_id: TaskId,
        agent_id: AgentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rationale: Option<String>,
    },
    TaskStarted {
        task_id: TaskId,
    },
    TaskCompleted {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    TaskFailed {
        task_id: TaskId,
        reason: String,
    },
    MetricUpdated {
        name: String,
        value: f64,
    },
    SnapshotCreated {
        snapshot_id: String,
    },
}

impl EventPayload {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentRegistered { .. } => "agent_registered",
            Self::AgentStatusChanged { .. } => "agent_status_changed",
            Self::TaskCreated { .. } => "task_created",
            Self::TaskAssigned { .. } => "task_assigned",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::MetricUpdated { .. } => "metric_updated",
            Self::SnapshotCreated { .. } => "snapshot_created",
        }
    }

    /// The task or agent the event is about, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::AgentRegistered { agent_id, .. } | Self::AgentStatusChanged { agent_id, .. } => {
                Some(agent_id.as_str())
            }
            Self::TaskCreated { task_id, .. }
            | Self::TaskAssigned { task_id, .. }
            | Self::TaskStarted { task_id }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. } => Some(task_id.as_str()),
            Self::MetricUpdated { name, .. } => Some(name.as_str()),
            Self::SnapshotCreated { snapshot_id } => Some(snapshot_id.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = Event {
            seq: 7,
            timestamp: Utc::now(),
            payload: EventPayload::TaskAssigned {
                task_id: "task-1".to_string(),
                agent_id: "worker-1".to_string(),
                rationale: None,
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["payload"]["type"], "task_assigned");
        assert_eq!(json["payload"]["agent_id"], "worker-1");
        assert!(json["payload"].get("rationale").is_none());
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let json = r#"{"seq":1,"timestamp":"2026-01-01T00:00:00Z","payload":{"type":"task_started"}}"#;
        assert!(serde_json::from_str::<Event>(json).is_err());
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let json = r#"{"seq":1,"timestamp":"2026-01-01T00:00:00Z","payload":{"type":"task_exploded","task_id":"t"}}"#;
        assert!(serde_json::from_str::<Event>(json).is_err());
    }

    #[test]
    fn test_kind_and_subject() {
        let payload = EventPayload::TaskFailed {
            task_id: "task-9".to_string(),
            reason: "pane closed".to_string(),
        };
        assert_eq!(payload.kind(), "task_failed");
        assert_eq!(payload.subject(), Some("task-9"));
    }
}
