// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Event log and state store.
//!
//! All state is a pure fold over an append-only event log:
//!
//! - **Types**: Agent, Task, SystemMetrics, SystemState
//! - **Events**: the tagged `EventPayload` enum and the sequenced `Event`
//! - **Fold**: applies one event to a state, rejecting inconsistent ones
//! - **Log**: the `EventLog` trait with memory, JSON file and SQLite backends
//! - **Store**: `StateStore`, the high-level API over an injected log
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       StateStore                          │
//! │   (create_task, assign_task, create_snapshot, ...)        │
//! └──────────────────────────────────────────────────────────┘
//!               │ append / read_after            │ apply
//!               ▼                                ▼
//! ┌──────────────────────────────┐      ┌─────────────────┐
//! │  dyn EventLog                │      │   fold (pure)   │
//! │  Memory | JsonFile | Sqlite  │      │  SystemState    │
//! └──────────────────────────────┘      └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use a2a::state::{open_log, AgentSpec, AgentRole, BackendKind, NewTask, StateStore};
//!
//! let log = open_log(BackendKind::Json, ".a2a/state.json".as_ref())?;
//! let mut store = StateStore::open(log)?;
//! store.create_initial_state(&[AgentSpec::new("coder-1", AgentRole::Coder)])?;
//!
//! let task = store.create_task(NewTask::new("Fix the login bug"))?;
//! store.assign_task(&task.id, "coder-1", None)?;
//! store.save_state()?;
//! ```

pub mod event;
pub mod file;
pub mod fold;
pub mod log;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

pub use event::{Event, EventPayload};
pub use file::JsonFileLog;
pub use fold::FoldRejection;
pub use log::{EventLog, LogHead, Snapshot, SnapshotInfo, SCHEMA_VERSION};
pub use memory::MemoryLog;
pub use sqlite::SqliteLog;
pub use store::{NewTask, StateStore, RECENT_EVENT_CAPACITY};
pub use types::{
    Agent, AgentId, AgentMetrics, AgentRole, AgentSpec, AgentStatus, Complexity, Priority,
    SystemMetrics, SystemState, Task, TaskId, TaskStatus, TaskType,
};

/// Which storage backend holds the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Single JSON state document.
    #[default]
    Json,
    /// SQLite database.
    Sqlite,
    /// Process-local, lost on exit.
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Sqlite => write!(f, "sqlite"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" | "file" => Ok(Self::Json),
            "sqlite" | "db" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown state backend: {}", other)),
        }
    }
}

/// Open the event log for a backend at `path` (ignored for memory).
pub fn open_log(kind: BackendKind, path: &Path) -> Result<Box<dyn EventLog>, StateError> {
    Ok(match kind {
        BackendKind::Json => Box::new(JsonFileLog::open(path)?),
        BackendKind::Sqlite => Box::new(SqliteLog::open(path)?),
        BackendKind::Memory => Box::new(MemoryLog::new()),
    })
}
