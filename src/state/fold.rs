// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The fold: applies one event to a [`SystemState`].
//!
//! The fold is pure. It reads only the state and the event (including the
//! event's own timestamp), so replaying the same ordered log always yields the
//! same state. An event that is inconsistent with the current state is
//! rejected: it is counted and logged as an anomaly, and the state is left
//! untouched apart from the log cursor.
//!
//! Key invariants:
//! - A task is assigned at most once; a second `task_assigned` is rejected.
//! - Task status only moves forward (see [`TaskStatus::can_transition_to`]).
//! - `task_completed` / `task_failed` require a running task
//!   (`task_failed` is also accepted from `assigned`).

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::StateError;

use super::event::{Event, EventPayload};
use super::types::{Agent, AgentStatus, SystemState, Task, TaskStatus};

/// Why an event was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldRejection {
    pub seq: u64,
    pub event: &'static str,
    pub subject: String,
    pub reason: String,
}

impl std::fmt::Display for FoldRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "event #{} ({}) rejected for {}: {}",
            self.seq, self.event, self.subject, self.reason
        )
    }
}

impl From<FoldRejection> for StateError {
    fn from(rejection: FoldRejection) -> Self {
        StateError::InvalidTransition {
            event: rejection.event.to_string(),
            subject: rejection.subject,
            reason: rejection.reason,
        }
    }
}

/// Apply one event to the state.
///
/// Always advances `last_seq`. On rejection the rest of the state is unchanged
/// and `events_rejected` is incremented.
pub fn apply(state: &mut SystemState, event: &Event) -> Result<(), FoldRejection> {
    let outcome = check(state, &event.payload).map_err(|(subject, reason)| FoldRejection {
        seq: event.seq,
        event: event.kind(),
        subject,
        reason,
    });

    match &outcome {
        Ok(()) => {
            mutate(state, &event.payload, event.timestamp);
            state.metrics.events_applied += 1;
        }
        Err(rejection) => {
            warn!(
                seq = rejection.seq,
                event = rejection.event,
                subject = %rejection.subject,
                reason = %rejection.reason,
                "Fold anomaly: event rejected"
            );
            state.metrics.events_rejected += 1;
        }
    }

    state.last_seq = event.seq;
    state.last_timestamp = Some(event.timestamp);
    if state.metrics.first_event_at.is_none() {
        state.metrics.first_event_at = Some(event.timestamp);
    }
    state.metrics.last_event_at = Some(event.timestamp);

    outcome
}

/// Validate a payload against the state without applying it.
pub fn validate(state: &SystemState, payload: &EventPayload) -> Result<(), StateError> {
    check(state, payload).map_err(|(subject, reason)| StateError::InvalidTransition {
        event: payload.kind().to_string(),
        subject,
        reason,
    })
}

/// Fold an ordered sequence of events onto a starting state.
///
/// Returns the rejections encountered, in order.
pub fn replay<'a>(
    state: &mut SystemState,
    events: impl IntoIterator<Item = &'a Event>,
) -> Vec<FoldRejection> {
    events
        .into_iter()
        .filter_map(|event| apply(state, event).err())
        .collect()
}

type Check = Result<(), (String, String)>;

fn reject(subject: &str, reason: impl Into<String>) -> Check {
    Err((subject.to_string(), reason.into()))
}

fn check(state: &SystemState, payload: &EventPayload) -> Check {
    match payload {
        EventPayload::AgentRegistered { agent_id, .. } => {
            if state.agents.contains_key(agent_id) {
                return reject(agent_id, "agent is already registered");
            }
            Ok(())
        }
        EventPayload::AgentStatusChanged { agent_id, .. } => {
            if !state.agents.contains_key(agent_id) {
                return reject(agent_id, "unknown agent");
            }
            Ok(())
        }
        EventPayload::TaskCreated { task_id, .. } => {
            if state.tasks.contains_key(task_id) {
                return reject(task_id, "task already exists");
            }
            Ok(())
        }
        EventPayload::TaskAssigned { task_id, agent_id, .. } => {
            let task = match state.tasks.get(task_id) {
                Some(task) => task,
                None => return reject(task_id, "unknown task"),
            };
            if let Some(current) = &task.assigned_agent {
                let reason = if current == agent_id {
                    format!("task is already assigned to {}", current)
                } else {
                    format!(
                        "task is already assigned to {} (routing race with {})",
                        current, agent_id
                    )
                };
                return reject(task_id, reason);
            }
            transition(task, TaskStatus::Assigned)?;
            match state.agents.get(agent_id) {
                None => reject(task_id, format!("unknown agent {}", agent_id)),
                Some(agent) if !agent.status.accepts_work() => reject(
                    task_id,
                    format!("agent {} is {}", agent_id, agent.status),
                ),
                Some(_) => Ok(()),
            }
        }
        EventPayload::TaskStarted { task_id } => {
            with_task(state, task_id, |task| transition(task, TaskStatus::Running))
        }
        EventPayload::TaskCompleted { task_id, .. } => {
            with_task(state, task_id, |task| transition(task, TaskStatus::Completed))
        }
        EventPayload::TaskFailed { task_id, .. } => {
            with_task(state, task_id, |task| transition(task, TaskStatus::Failed))
        }
        EventPayload::MetricUpdated { name, value } => {
            if name.trim().is_empty() {
                return reject(name, "metric name is empty");
            }
            if !value.is_finite() {
                return reject(name, "metric value is not finite");
            }
            Ok(())
        }
        EventPayload::SnapshotCreated { .. } => Ok(()),
    }
}

fn with_task(state: &SystemState, task_id: &str, f: impl FnOnce(&Task) -> Check) -> Check {
    match state.tasks.get(task_id) {
        Some(task) => f(task),
        None => reject(task_id, "unknown task"),
    }
}

fn transition(task: &Task, next: TaskStatus) -> Check {
    if task.status.can_transition_to(next) {
        Ok(())
    } else {
        reject(
            &task.id,
            format!("cannot move from {} to {}", task.status, next),
        )
    }
}

/// Apply a payload already known to be valid.
fn mutate(state: &mut SystemState, payload: &EventPayload, at: DateTime<Utc>) {
    match payload {
        EventPayload::AgentRegistered {
            agent_id,
            role,
            pane,
        } => {
            let mut agent = Agent::new(agent_id.clone(), *role, at);
            agent.pane = pane.clone();
            state.agents.insert(agent_id.clone(), agent);
            state.metrics.agent_load.insert(agent_id.clone(), 0);
        }
        EventPayload::AgentStatusChanged {
            agent_id, status, ..
        } => {
            if let Some(agent) = state.agents.get_mut(agent_id) {
                agent.status = *status;
                agent.status_changed_at = at;
            }
        }
        EventPayload::TaskCreated {
            task_id,
            description,
            task_type,
            priority,
            complexity,
            tags,
        } => {
            state.tasks.insert(
                task_id.clone(),
                Task {
                    id: task_id.clone(),
                    description: description.clone(),
                    task_type: *task_type,
                    priority: *priority,
                    complexity: *complexity,
                    tags: tags.clone(),
                    status: TaskStatus::Pending,
                    assigned_agent: None,
                    created_at: at,
                    assigned_at: None,
                    started_at: None,
                    completed_at: None,
                    result: None,
                    error: None,
                },
            );
            state.metrics.tasks_created += 1;
        }
        EventPayload::TaskAssigned {
            task_id, agent_id, ..
        } => {
            if let Some(task) = state.tasks.get_mut(task_id) {
                task.status = TaskStatus::Assigned;
                task.assigned_agent = Some(agent_id.clone());
                task.assigned_at = Some(at);
            }
            if let Some(agent) = state.agents.get_mut(agent_id) {
                if agent.status != AgentStatus::Busy {
                    agent.status = AgentStatus::Busy;
                    agent.status_changed_at = at;
                }
                if agent.current_task.is_none() {
                    agent.current_task = Some(task_id.clone());
                }
            }
            *state.metrics.agent_load.entry(agent_id.clone()).or_insert(0) += 1;
        }
        EventPayload::TaskStarted { task_id } => {
            let mut owner = None;
            if let Some(task) = state.tasks.get_mut(task_id) {
                task.status = TaskStatus::Running;
                task.started_at = Some(at);
                owner = task.assigned_agent.clone();
            }
            if let Some(agent_id) = owner {
                if let Some(agent) = state.agents.get_mut(&agent_id) {
                    agent.current_task = Some(task_id.clone());
                }
            }
        }
        EventPayload::TaskCompleted { task_id, result } => {
            let mut finished = None;
            if let Some(task) = state.tasks.get_mut(task_id) {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(at);
                task.result = result.clone();
                finished = task
                    .assigned_agent
                    .clone()
                    .map(|agent| (agent, task.run_duration_ms().unwrap_or(0)));
            }
            state.metrics.tasks_completed += 1;
            if let Some((agent_id, duration_ms)) = finished {
                if let Some(agent) = state.agents.get_mut(&agent_id) {
                    agent.metrics.record_completion(duration_ms);
                }
                release(state, &agent_id, at);
            }
        }
        EventPayload::TaskFailed { task_id, reason } => {
            let mut owner = None;
            if let Some(task) = state.tasks.get_mut(task_id) {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(at);
                task.error = Some(reason.clone());
                owner = task.assigned_agent.clone();
            }
            state.metrics.tasks_failed += 1;
            if let Some(agent_id) = owner {
                if let Some(agent) = state.agents.get_mut(&agent_id) {
                    agent.metrics.record_failure();
                }
                release(state, &agent_id, at);
            }
        }
        EventPayload::MetricUpdated { name, value } => {
            state.metrics.gauges.insert(name.clone(), *value);
        }
        EventPayload::SnapshotCreated { snapshot_id } => {
            state.metrics.snapshots_created += 1;
            state.metrics.last_snapshot_id = Some(snapshot_id.clone());
        }
    }
}

/// Drop one unit of load from an agent and point it at its next active task.
fn release(state: &mut SystemState, agent_id: &str, at: DateTime<Utc>) {
    if let Some(load) = state.metrics.agent_load.get_mut(agent_id) {
        *load = load.saturating_sub(1);
    }

    let next = state
        .active_tasks_for(agent_id)
        .first()
        .map(|task| task.id.clone());

    if let Some(agent) = state.agents.get_mut(agent_id) {
        if next.is_none() && agent.status == AgentStatus::Busy {
            agent.status = AgentStatus::Idle;
            agent.status_changed_at = at;
        }
        agent.current_task = next;
    }
}
