// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Health checks over the derived state.
//!
//! Everything here is a read. Nothing watches the agents in the background;
//! callers poll (e.g. `a2a health` every `healthInterval` seconds).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{AgentStatus, SystemState, TaskStatus};

/// Limits a report is checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    /// Assigned or running tasks untouched for longer than this are stalled.
    pub stall_after: Duration,
    pub min_workers: usize,
    pub max_workers: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            stall_after: Duration::minutes(30),
            min_workers: 1,
            max_workers: 8,
        }
    }
}

/// Online-worker count relative to the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerCapacity {
    BelowMinimum,
    Ok,
    AboveMaximum,
}

/// A task that has not moved for too long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalledTask {
    pub task_id: String,
    pub agent_id: Option<String>,
    pub status: TaskStatus,
    pub idle_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub online_workers: usize,
    pub capacity: WorkerCapacity,
    pub stalled_tasks: Vec<StalledTask>,
    pub error_agents: Vec<String>,
    pub pending_tasks: usize,
    pub error_rate: f64,
}

impl HealthReport {
    /// No stalled tasks, no agents in error, worker count within bounds.
    pub fn is_healthy(&self) -> bool {
        self.stalled_tasks.is_empty()
            && self.error_agents.is_empty()
            && self.capacity == WorkerCapacity::Ok
    }

    /// One line per problem, empty when healthy.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        match self.capacity {
            WorkerCapacity::BelowMinimum => {
                issues.push(format!("only {} workers online", self.online_workers))
            }
            WorkerCapacity::AboveMaximum => {
                issues.push(format!("{} workers online, above maximum", self.online_workers))
            }
            WorkerCapacity::Ok => {}
        }
        for agent in &self.error_agents {
            issues.push(format!("agent {} is in error", agent));
        }
        for task in &self.stalled_tasks {
            issues.push(format!(
                "task {} {} for {}m on {}",
                task.task_id,
                task.status,
                task.idle_secs / 60,
                task.agent_id.as_deref().unwrap_or("nobody")
            ));
        }
        issues
    }
}

/// Build a health report for `state` as of `now`.
pub fn check_health(
    state: &SystemState,
    thresholds: &HealthThresholds,
    now: DateTime<Utc>,
) -> HealthReport {
    let online_workers = state
        .agents
        .values()
        .filter(|a| a.status.is_online())
        .count();

    let capacity = if online_workers < thresholds.min_workers {
        WorkerCapacity::BelowMinimum
    } else if online_workers > thresholds.max_workers {
        WorkerCapacity::AboveMaximum
    } else {
        WorkerCapacity::Ok
    };

    let mut stalled_tasks: Vec<StalledTask> = state
        .tasks
        .values()
        .filter_map(|task| {
            let since = match task.status {
                TaskStatus::Running => task.started_at,
                TaskStatus::Assigned => task.assigned_at,
                _ => None,
            }?;
            let idle = now - since;
            (idle > thresholds.stall_after).then(|| StalledTask {
                task_id: task.id.clone(),
                agent_id: task.assigned_agent.clone(),
                status: task.status,
                idle_secs: idle.num_seconds(),
            })
        })
        .collect();
    stalled_tasks.sort_by(|a, b| b.idle_secs.cmp(&a.idle_secs).then(a.task_id.cmp(&b.task_id)));

    let error_agents = state
        .agents
        .values()
        .filter(|a| a.status == AgentStatus::Error)
        .map(|a| a.id.clone())
        .collect();

    HealthReport {
        generated_at: now,
        online_workers,
        capacity,
        stalled_tasks,
        error_agents,
        pending_tasks: state.pending_tasks().len(),
        error_rate: state.metrics.error_rate(),
    }
}
