// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the A2A coordination engine.
//!
//! This module provides strongly-typed errors for the state store, the router,
//! configuration loading and the agent execution surface, using `thiserror`
//! for the definitions and `anyhow` for propagation in the binary.

use thiserror::Error;

/// Errors that can occur in the event log and state store.
#[derive(Error, Debug)]
pub enum StateError {
    /// The backing store could not be written. No event was recorded.
    #[error("Failed to write state store: {0}")]
    WriteError(String),

    /// The log or a snapshot is unreadable or fails schema validation.
    #[error("State is corrupt: {0}")]
    CorruptState(String),

    /// An event is inconsistent with the current task/agent state.
    #[error("Invalid transition for {subject} on {event}: {reason}")]
    InvalidTransition {
        event: String,
        subject: String,
        reason: String,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Snapshot {snapshot_id} covers offset {offset} but the log is compacted through {compacted_through}")]
    SnapshotCompacted {
        snapshot_id: String,
        offset: u64,
        compacted_through: u64,
    },
}

impl StateError {
    /// Create an invalid transition error.
    pub fn invalid_transition(
        event: impl Into<String>,
        subject: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            event: event.into(),
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error means the process must not continue with its state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CorruptState(_))
    }
}

impl From<std::io::Error> for StateError {
    fn from(err: std::io::Error) -> Self {
        Self::WriteError(err.to_string())
    }
}

impl From<rusqlite::Error> for StateError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::NotADatabase | rusqlite::ErrorCode::DatabaseCorrupt) => {
                Self::CorruptState(format!("sqlite: {}", err))
            }
            _ => Self::WriteError(format!("sqlite: {}", err)),
        }
    }
}

/// Errors that can occur while routing a task to an agent.
#[derive(Error, Debug)]
pub enum RoutingError {
    /// No agent qualifies for the task. The task stays pending.
    #[error("No available agent for task {task_id}: {reason}")]
    NoAvailableAgent { task_id: String, reason: String },

    /// A concurrent assignment won the race twice in a row.
    #[error("Routing conflict for task {task_id} after {attempts} attempts")]
    RoutingConflict { task_id: String, attempts: u32 },

    #[error("Task {task_id} is not pending (status: {status})")]
    TaskNotPending { task_id: String, status: String },

    #[error("Invalid classifier rule {rule}: {message}")]
    InvalidRule { rule: String, message: String },

    #[error("State error: {0}")]
    State(#[from] StateError),
}

impl RoutingError {
    /// Check if the caller can queue, escalate or resubmit.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoAvailableAgent { .. } | Self::RoutingConflict { .. }
        )
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors from the agent execution surface.
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Delivery to {target} failed: {message}")]
    DeliveryFailed { target: String, message: String },

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for SurfaceError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_error_recoverable() {
        assert!(RoutingError::NoAvailableAgent {
            task_id: "t1".to_string(),
            reason: "all busy".to_string(),
        }
        .is_recoverable());
        assert!(RoutingError::RoutingConflict {
            task_id: "t1".to_string(),
            attempts: 2,
        }
        .is_recoverable());
        assert!(!RoutingError::State(StateError::TaskNotFound("t1".to_string())).is_recoverable());
    }

    #[test]
    fn test_state_error_fatal() {
        assert!(StateError::CorruptState("bad".to_string()).is_fatal());
        assert!(!StateError::WriteError("disk full".to_string()).is_fatal());
    }

    #[test]
    fn test_state_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: StateError = io_err.into();
        assert!(matches!(err, StateError::WriteError(_)));
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = StateError::invalid_transition("task_completed", "task-1", "task is pending");
        let display = format!("{}", err);
        assert!(display.contains("task-1"));
        assert!(display.contains("task_completed"));
        assert!(display.contains("pending"));
    }
}
