// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core types for agents, tasks and the derived system state.
//!
//! Everything in [`SystemState`] is derived by folding the event log, so these
//! types carry no behavior that depends on wall-clock time or I/O.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent identifier (e.g. "worker-1").
pub type AgentId = String;

/// Task identifier.
pub type TaskId = String;

// ============================================================================
// Enum parsing
// ============================================================================

/// Error returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// Implements `Display`, `FromStr` and `all()` for a unit enum using its
/// snake_case wire names.
macro_rules! wire_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// All variants in declaration order.
            pub fn all() -> &'static [$ty] {
                &[$($ty::$variant),+]
            }

            /// The snake_case wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(ParseEnumError { kind: $kind, value: s.to_string() }),
                }
            }
        }
    };
}

// ============================================================================
// Agents
// ============================================================================

/// Worker specialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Splits and hands out work; rarely routed to directly.
    Coordinator,
    Coder,
    Reviewer,
    Tester,
    Researcher,
    Writer,
    /// Accepts any task at reduced affinity.
    Generalist,
}

wire_enum!(AgentRole, "agent role", {
    Coordinator => "coordinator",
    Coder => "coder",
    Reviewer => "reviewer",
    Tester => "tester",
    Researcher => "researcher",
    Writer => "writer",
    Generalist => "generalist",
});

/// Agent availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Offline,
}

wire_enum!(AgentStatus, "agent status", {
    Idle => "idle",
    Busy => "busy",
    Error => "error",
    Offline => "offline",
});

impl AgentStatus {
    /// Check if the agent can be handed work at all.
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Idle | Self::Busy)
    }

    /// Check if the agent process is considered present.
    pub fn is_online(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

/// Cumulative per-agent counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub error_count: u64,
    /// Sum of started→completed durations of completed tasks.
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
}

impl AgentMetrics {
    /// Record a completed task that ran for `duration_ms`.
    pub fn record_completion(&mut self, duration_ms: u64) {
        self.tasks_completed += 1;
        self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
        self.average_duration_ms = self.total_duration_ms / self.tasks_completed;
    }

    /// Record a failed task.
    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
        self.error_count += 1;
    }
}

/// A named worker unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub role: AgentRole,
    pub status: AgentStatus,
    /// Execution-surface target; the agent id is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane: Option<String>,
    #[serde(default)]
    pub current_task: Option<TaskId>,
    #[serde(default)]
    pub metrics: AgentMetrics,
    pub registered_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl Agent {
    /// Create an idle agent.
    pub fn new(id: impl Into<AgentId>, role: AgentRole, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role,
            status: AgentStatus::Idle,
            pane: None,
            current_task: None,
            metrics: AgentMetrics::default(),
            registered_at: at,
            status_changed_at: at,
        }
    }

    /// The execution-surface target for this agent.
    pub fn target(&self) -> &str {
        self.pane.as_deref().unwrap_or(&self.id)
    }
}

/// Bootstrap description of an agent in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: AgentId,
    pub role: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane: Option<String>,
}

impl AgentSpec {
    pub fn new(id: impl Into<AgentId>, role: AgentRole) -> Self {
        Self {
            id: id.into(),
            role,
            pane: None,
        }
    }

    /// Set the execution-surface target.
    pub fn with_pane(mut self, pane: impl Into<String>) -> Self {
        self.pane = Some(pane.into());
        self
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Task category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Coding,
    Review,
    Testing,
    Research,
    Documentation,
    Design,
    #[default]
    General,
}

wire_enum!(TaskType, "task type", {
    Coding => "coding",
    Review => "review",
    Testing => "testing",
    Research => "research",
    Documentation => "documentation",
    Design => "design",
    General => "general",
});

/// Task priority, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

wire_enum!(Priority, "priority", {
    Low => "low",
    Normal => "normal",
    High => "high",
    Critical => "critical",
});

/// Estimated task complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

wire_enum!(Complexity, "complexity", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Task lifecycle status.
///
/// `pending → assigned → running → completed`, with `running → failed` and
/// `assigned → failed`. Transitions never go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
}

wire_enum!(TaskStatus, "task status", {
    Pending => "pending",
    Assigned => "assigned",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

impl TaskStatus {
    /// Position in the lifecycle; terminal states share the highest rank.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Assigned => 1,
            Self::Running => 2,
            Self::Completed | Self::Failed => 3,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if the task holds an agent slot.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Assigned | Self::Running)
    }

    /// Check if `next` is a legal single-step transition from this status.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Assigned)
                | (Self::Assigned, Self::Running)
                | (Self::Assigned, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

/// A unit of work to route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub task_type: TaskType,
    pub priority: Priority,
    pub complexity: Complexity,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub assigned_agent: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the task reaches a terminal status.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Wall time between start and completion, if both are known.
    pub fn run_duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

// ============================================================================
// Derived state
// ============================================================================

/// Aggregate counters derived from the log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub tasks_created: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub events_applied: u64,
    pub events_rejected: u64,
    pub snapshots_created: u64,
    #[serde(default)]
    pub last_snapshot_id: Option<String>,
    /// Assigned + running tasks per agent.
    #[serde(default)]
    pub agent_load: BTreeMap<AgentId, u32>,
    /// Named gauges set through `metric_updated` events.
    #[serde(default)]
    pub gauges: BTreeMap<String, f64>,
    #[serde(default)]
    pub first_event_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl SystemMetrics {
    /// Failed share of finished tasks (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        let finished = self.tasks_completed + self.tasks_failed;
        if finished == 0 {
            0.0
        } else {
            self.tasks_failed as f64 / finished as f64
        }
    }

    /// Completed tasks per hour over the observed event window.
    pub fn throughput_per_hour(&self) -> f64 {
        match (self.first_event_at, self.last_event_at) {
            (Some(first), Some(last)) => {
                let secs = (last - first).num_seconds();
                if secs <= 0 {
                    self.tasks_completed as f64
                } else {
                    self.tasks_completed as f64 * 3600.0 / secs as f64
                }
            }
            _ => 0.0,
        }
    }

    /// Current load of an agent.
    pub fn load_of(&self, agent_id: &str) -> u32 {
        self.agent_load.get(agent_id).copied().unwrap_or(0)
    }
}

/// The full derived state: a pure fold over the event log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub agents: BTreeMap<AgentId, Agent>,
    pub tasks: BTreeMap<TaskId, Task>,
    pub metrics: SystemMetrics,
    /// Sequence of the last folded event (accepted or rejected).
    pub last_seq: u64,
    #[serde(default)]
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl SystemState {
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Pending tasks, highest priority first, then oldest first.
    pub fn pending_tasks(&self) -> Vec<&Task> {
        let mut pending: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        pending
    }

    /// Assigned and running tasks held by an agent, running first then by id.
    pub fn active_tasks_for(&self, agent_id: &str) -> Vec<&Task> {
        let mut active: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status.is_active() && t.assigned_agent.as_deref() == Some(agent_id))
            .collect();
        active.sort_by(|a, b| {
            b.status
                .rank()
                .cmp(&a.status.rank())
                .then(a.id.cmp(&b.id))
        });
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Assigned));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Assigned.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_enum_round_trip_names() {
        for role in AgentRole::all() {
            assert_eq!(role.as_str().parse::<AgentRole>().unwrap(), *role);
        }
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_agent_metrics_average() {
        let mut metrics = AgentMetrics::default();
        metrics.record_completion(100);
        metrics.record_completion(300);
        assert_eq!(metrics.tasks_completed, 2);
        assert_eq!(metrics.average_duration_ms, 200);
    }

    #[test]
    fn test_error_rate() {
        let metrics = SystemMetrics {
            tasks_completed: 3,
            tasks_failed: 1,
            ..Default::default()
        };
        assert!((metrics.error_rate() - 0.25).abs() < f64::EPSILON);
        assert_eq!(SystemMetrics::default().error_rate(), 0.0);
    }

    #[test]
    fn test_agent_target_defaults_to_id() {
        let mut agent = Agent::new("worker-1", AgentRole::Coder, Utc::now());
        assert_eq!(agent.target(), "worker-1");
        agent.pane = Some("a2a:0.1".to_string());
        assert_eq!(agent.target(), "a2a:0.1");
    }
}
