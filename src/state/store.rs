// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The state store: an in-memory fold over an injected [`EventLog`].
//!
//! Every mutation goes through [`StateStore::log_event`]: validate against the
//! current state, append to the log (which assigns the sequence), fold any
//! events other writers appended first, then fold our own. Reads are pure and
//! never touch the log.

use std::collections::VecDeque;
#[cfg(feature = "telemetry")]
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
#[cfg(feature = "telemetry")]
use tracing::instrument;
use uuid::Uuid;

use crate::error::StateError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::event::{Event, EventPayload};
use super::fold;
use super::log::{validate_sequence, EventLog, Snapshot, SnapshotInfo, SCHEMA_VERSION};
use super::memory::MemoryLog;
use super::types::{
    Agent, AgentSpec, AgentStatus, Complexity, Priority, SystemMetrics, SystemState, Task,
    TaskType,
};

/// Number of events kept for [`StateStore::get_recent_events`].
pub const RECENT_EVENT_CAPACITY: usize = 500;

/// Input for [`StateStore::create_task`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Explicit id; a UUID is generated when absent.
    pub id: Option<String>,
    pub description: String,
    pub task_type: TaskType,
    pub priority: Priority,
    pub complexity: Complexity,
    pub tags: Vec<String>,
}

impl NewTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Derived, process-private view of the event log.
pub struct StateStore {
    log: Box<dyn EventLog>,
    state: SystemState,
    recent: VecDeque<Event>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("log", &self.log.describe())
            .field("last_seq", &self.state.last_seq)
            .finish()
    }
}

impl StateStore {
    /// Wrap a log without reading it. Call [`load_state`](Self::load_state) next.
    pub fn new(log: Box<dyn EventLog>) -> Self {
        Self {
            log,
            state: SystemState::default(),
            recent: VecDeque::new(),
        }
    }

    /// Wrap a log and load its state.
    pub fn open(log: Box<dyn EventLog>) -> Result<Self, StateError> {
        let mut store = Self::new(log);
        store.load_state()?;
        Ok(store)
    }

    /// A store over a fresh in-memory log.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryLog::new()))
    }

    /// The current derived state.
    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Where the log lives.
    pub fn describe(&self) -> String {
        self.log.describe()
    }

    // ========================================================================
    // Loading and persistence
    // ========================================================================

    /// Rebuild state from the latest snapshot plus every later event.
    ///
    /// Fails with [`StateError::CorruptState`] if the log is unreadable or out
    /// of order; the process should refuse to start in that case.
    #[cfg_attr(feature = "telemetry", instrument(skip(self), fields(log = %self.log.describe())))]
    pub fn load_state(&mut self) -> Result<&SystemState, StateError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let snapshot = self.log.latest_snapshot()?;
        let compacted_through = self.log.compacted_through()?;

        let (base, offset) = match snapshot {
            Some(snapshot) => {
                if snapshot.version > SCHEMA_VERSION {
                    return Err(StateError::CorruptState(format!(
                        "snapshot {} has schema version {}",
                        snapshot.id, snapshot.version
                    )));
                }
                let offset = snapshot.offset;
                (snapshot.state, offset)
            }
            None => (SystemState::default(), 0),
        };

        if offset < compacted_through {
            return Err(StateError::CorruptState(format!(
                "log is compacted through #{} but the newest snapshot covers only #{}",
                compacted_through, offset
            )));
        }

        let events = self.log.read_after(offset)?;
        self.rebuild(base, events)?;

        info!(
            last_seq = self.state.last_seq,
            agents = self.state.agents.len(),
            tasks = self.state.tasks.len(),
            "Loaded state"
        );

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("state.store.load", start.elapsed());

        Ok(&self.state)
    }

    /// Fold events appended by other writers since the last one seen.
    ///
    /// Returns the number of events folded.
    pub fn refresh(&mut self) -> Result<usize, StateError> {
        let events = self.log.read_after(self.state.last_seq)?;
        validate_sequence(&events, self.state.last_seq)?;
        let count = events.len();
        for event in events {
            let _ = fold::apply(&mut self.state, &event);
            self.push_recent(event);
        }
        if count > 0 {
            debug!(count, last_seq = self.state.last_seq, "Refreshed state");
        }
        Ok(count)
    }

    /// Persist the materialized view of the current state.
    pub fn save_state(&mut self) -> Result<(), StateError> {
        self.log.save_view(&self.state)
    }

    fn rebuild(&mut self, base: SystemState, events: Vec<Event>) -> Result<(), StateError> {
        validate_sequence(&events, base.last_seq)?;

        let mut state = base;
        let rejected = fold::replay(&mut state, &events);
        if !rejected.is_empty() {
            warn!(count = rejected.len(), "Replay rejected events");
        }

        let skip = events.len().saturating_sub(RECENT_EVENT_CAPACITY);
        self.recent = events.into_iter().skip(skip).collect();
        self.state = state;
        Ok(())
    }

    fn push_recent(&mut self, event: Event) {
        if self.recent.len() == RECENT_EVENT_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(event);
    }

    // ========================================================================
    // Event logging
    // ========================================================================

    /// Validate, append and fold one event.
    ///
    /// An invalid payload is refused without writing. If another writer got
    /// in first and the fold rejects the appended event, the event stays in
    /// the log and [`StateError::InvalidTransition`] is returned.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, payload), fields(kind = payload.kind())))]
    pub fn log_event(&mut self, payload: EventPayload) -> Result<Event, StateError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        fold::validate(&self.state, &payload)?;
        let event = self.log.append(payload)?;

        if event.seq > self.state.last_seq + 1 {
            let missed: Vec<Event> = self
                .log
                .read_after(self.state.last_seq)?
                .into_iter()
                .filter(|e| e.seq < event.seq)
                .collect();
            validate_sequence(&missed, self.state.last_seq)?;
            debug!(count = missed.len(), "Folding events from other writers");
            for missed_event in missed {
                let _ = fold::apply(&mut self.state, &missed_event);
                self.push_recent(missed_event);
            }
        }

        let outcome = fold::apply(&mut self.state, &event);
        self.push_recent(event.clone());

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("state.store.log_event", start.elapsed());

        outcome?;
        Ok(event)
    }

    /// The last `limit` folded events, oldest first.
    pub fn get_recent_events(&self, limit: usize) -> Vec<&Event> {
        let skip = self.recent.len().saturating_sub(limit);
        self.recent.iter().skip(skip).collect()
    }

    // ========================================================================
    // Agents
    // ========================================================================

    /// Register every agent in `roster` that is not already known.
    ///
    /// Returns the number of agents registered.
    pub fn create_initial_state(&mut self, roster: &[AgentSpec]) -> Result<usize, StateError> {
        let mut registered = 0;
        for spec in roster {
            if self.state.agents.contains_key(&spec.id) {
                continue;
            }
            self.register_agent(spec)?;
            registered += 1;
        }
        if registered > 0 {
            info!(registered, total = self.state.agents.len(), "Registered agents");
        }
        Ok(registered)
    }

    pub fn register_agent(&mut self, spec: &AgentSpec) -> Result<Event, StateError> {
        self.log_event(EventPayload::AgentRegistered {
            agent_id: spec.id.clone(),
            role: spec.role,
            pane: spec.pane.clone(),
        })
    }

    pub fn update_agent_status(
        &mut self,
        agent_id: &str,
        status: AgentStatus,
        reason: Option<String>,
    ) -> Result<Event, StateError> {
        if !self.state.agents.contains_key(agent_id) {
            return Err(StateError::AgentNotFound(agent_id.to_string()));
        }
        let event = self.log_event(EventPayload::AgentStatusChanged {
            agent_id: agent_id.to_string(),
            status,
            reason,
        })?;
        info!(agent = agent_id, %status, "Agent status changed");
        Ok(event)
    }

    pub fn get_agent_status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.state.agent(agent_id).map(|a| a.status)
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<&Agent> {
        self.state.agent(agent_id)
    }

    /// All agents, ordered by id.
    pub fn get_all_agent_statuses(&self) -> Vec<&Agent> {
        self.state.agents.values().collect()
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub fn create_task(&mut self, new: NewTask) -> Result<Task, StateError> {
        let task_id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.log_event(EventPayload::TaskCreated {
            task_id: task_id.clone(),
            description: new.description,
            task_type: new.task_type,
            priority: new.priority,
            complexity: new.complexity,
            tags: new.tags,
        })?;
        info!(task = %task_id, "Task created");
        self.require_task(&task_id).cloned()
    }

    pub fn assign_task(
        &mut self,
        task_id: &str,
        agent_id: &str,
        rationale: Option<String>,
    ) -> Result<Event, StateError> {
        self.require_task(task_id)?;
        if !self.state.agents.contains_key(agent_id) {
            return Err(StateError::AgentNotFound(agent_id.to_string()));
        }
        let event = self.log_event(EventPayload::TaskAssigned {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            rationale,
        })?;
        info!(task = task_id, agent = agent_id, seq = event.seq, "Task assigned");
        Ok(event)
    }

    pub fn start_task(&mut self, task_id: &str) -> Result<Event, StateError> {
        self.require_task(task_id)?;
        let event = self.log_event(EventPayload::TaskStarted {
            task_id: task_id.to_string(),
        })?;
        info!(task = task_id, "Task started");
        Ok(event)
    }

    pub fn complete_task(
        &mut self,
        task_id: &str,
        result: Option<String>,
    ) -> Result<Event, StateError> {
        self.require_task(task_id)?;
        let event = self.log_event(EventPayload::TaskCompleted {
            task_id: task_id.to_string(),
            result,
        })?;
        info!(task = task_id, "Task completed");
        Ok(event)
    }

    pub fn fail_task(
        &mut self,
        task_id: &str,
        reason: impl Into<String>,
    ) -> Result<Event, StateError> {
        self.require_task(task_id)?;
        let reason = reason.into();
        let event = self.log_event(EventPayload::TaskFailed {
            task_id: task_id.to_string(),
            reason: reason.clone(),
        })?;
        warn!(task = task_id, reason = %reason, "Task failed");
        Ok(event)
    }

    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.state.task(task_id)
    }

    /// Pending tasks, highest priority first, then oldest first.
    pub fn get_pending_tasks(&self) -> Vec<&Task> {
        self.state.pending_tasks()
    }

    fn require_task(&self, task_id: &str) -> Result<&Task, StateError> {
        self.state
            .task(task_id)
            .ok_or_else(|| StateError::TaskNotFound(task_id.to_string()))
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Set a named gauge.
    pub fn update_metrics(&mut self, name: &str, value: f64) -> Result<Event, StateError> {
        self.log_event(EventPayload::MetricUpdated {
            name: name.to_string(),
            value,
        })
    }

    pub fn get_metrics(&self) -> &SystemMetrics {
        &self.state.metrics
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Record a snapshot of the current state. The log is not truncated.
    ///
    /// The `snapshot_created` event is appended first, so the snapshot covers
    /// its own marker.
    pub fn create_snapshot(&mut self) -> Result<SnapshotInfo, StateError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let snapshot_id = Uuid::new_v4().to_string();
        self.log_event(EventPayload::SnapshotCreated {
            snapshot_id: snapshot_id.clone(),
        })?;

        let snapshot = Snapshot {
            id: snapshot_id,
            offset: self.state.last_seq,
            created_at: Utc::now(),
            version: SCHEMA_VERSION,
            state: self.state.clone(),
        };
        self.log.save_snapshot(&snapshot)?;
        info!(snapshot = %snapshot.id, offset = snapshot.offset, "Snapshot created");

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("state.store.snapshot", start.elapsed());

        Ok(snapshot.info())
    }

    /// Discard in-memory state and rebuild it from `snapshot_id` forward.
    pub fn restore_from_snapshot(&mut self, snapshot_id: &str) -> Result<&SystemState, StateError> {
        let snapshot = self
            .log
            .load_snapshot(snapshot_id)?
            .ok_or_else(|| StateError::SnapshotNotFound(snapshot_id.to_string()))?;

        let compacted_through = self.log.compacted_through()?;
        if snapshot.offset < compacted_through {
            return Err(StateError::SnapshotCompacted {
                snapshot_id: snapshot.id,
                offset: snapshot.offset,
                compacted_through,
            });
        }

        let events = self.log.read_after(snapshot.offset)?;
        self.rebuild(snapshot.state, events)?;
        info!(snapshot = snapshot_id, last_seq = self.state.last_seq, "Restored from snapshot");
        Ok(&self.state)
    }

    pub fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, StateError> {
        self.log.list_snapshots()
    }

    /// Drop the events a snapshot covers. Snapshots themselves are kept.
    pub fn compact_log(&mut self, snapshot_id: &str) -> Result<usize, StateError> {
        let snapshot = self
            .log
            .load_snapshot(snapshot_id)?
            .ok_or_else(|| StateError::SnapshotNotFound(snapshot_id.to_string()))?;
        let removed = self.log.compact(snapshot.offset)?;
        info!(snapshot = snapshot_id, through = snapshot.offset, removed, "Compacted log");
        Ok(removed)
    }
}
