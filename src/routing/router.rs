// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task router.
//!
//! Picks an agent for a classified task and applies the choice as a
//! `task_assigned` event.
//!
//! Selection:
//! 1. Candidate pool: the first `max_workers` non-offline agents by id.
//! 2. Filter: role affinity above zero, and status `idle` or `busy` with a
//!    load below `load_threshold`. An agent that reports `busy` counts at
//!    least one active task.
//! 3. Rank by load, then `load_weight × load − affinity_weight × affinity`
//!    (lower wins), then fewer cumulative errors, then agent id.
//!
//! No candidate is an immediate [`RoutingError::NoAvailableAgent`]; the task
//! stays pending. The only retry is a single re-route after a lost race.

use std::collections::BTreeMap;
#[cfg(feature = "telemetry")]
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RoutingError, StateError};
use crate::state::{
    AgentRole, AgentStatus, NewTask, Priority, StateStore, SystemState, Task, TaskStatus,
};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::classifier::{TaskClassification, TaskClassifier, TaskMetadata};

/// Attempts made by [`Router::route_task`] before giving up on a race.
pub const MAX_ROUTING_ATTEMPTS: u32 = 2;

// ============================================================================
// Configuration
// ============================================================================

/// Router tuning. All of it is configuration data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingConfig {
    /// Fewer online agents than this logs a warning.
    pub min_workers: usize,
    /// Upper bound on the candidate pool.
    pub max_workers: usize,
    /// A busy agent below this many active tasks still takes work.
    /// The default of 1 keeps busy agents out of the pool.
    pub load_threshold: u32,
    pub load_weight: f64,
    pub affinity_weight: f64,
    /// Affinity of the generalist role for any task.
    pub generalist_affinity: f64,
    /// Capability tags each role covers.
    pub role_tags: BTreeMap<AgentRole, Vec<String>>,
    /// Multiplexer session used to address agent panes.
    pub session: String,
}

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let mut role_tags = BTreeMap::new();
        role_tags.insert(AgentRole::Coordinator, tags(&["design", "architecture", "planning"]));
        role_tags.insert(AgentRole::Coder, tags(&["code", "implementation", "debugging"]));
        role_tags.insert(AgentRole::Reviewer, tags(&["review", "quality", "code"]));
        role_tags.insert(AgentRole::Tester, tags(&["testing", "quality"]));
        role_tags.insert(AgentRole::Researcher, tags(&["research", "analysis"]));
        role_tags.insert(AgentRole::Writer, tags(&["docs", "writing"]));

        Self {
            min_workers: 1,
            max_workers: 8,
            load_threshold: 1,
            load_weight: 1.0,
            affinity_weight: 2.0,
            generalist_affinity: 0.5,
            role_tags,
            session: "a2a".to_string(),
        }
    }
}

impl RoutingConfig {
    /// Fraction of the task's tags a role covers, in `[0, 1]`.
    ///
    /// A task without tags fits every role fully.
    pub fn affinity(&self, role: AgentRole, task_tags: &[String]) -> f64 {
        if task_tags.is_empty() {
            return 1.0;
        }
        if role == AgentRole::Generalist {
            return self.generalist_affinity;
        }
        let covered = match self.role_tags.get(&role) {
            Some(role_tags) => task_tags
                .iter()
                .filter(|tag| role_tags.iter().any(|r| r.eq_ignore_ascii_case(tag)))
                .count(),
            None => 0,
        };
        covered as f64 / task_tags.len() as f64
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// The router's choice for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub task_id: String,
    pub agent_id: String,
    pub role: AgentRole,
    pub score: f64,
    pub affinity: f64,
    pub load: u32,
    pub rationale: String,
}

/// Instruction for the agent's execution surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingCommand {
    /// Surface address, e.g. `session:pane`.
    pub target: String,
    pub message: String,
}

/// A task entering the system through [`Router::route_to_next_agent`].
#[derive(Debug, Clone, Default)]
pub struct TaskSubmission {
    pub id: Option<String>,
    pub description: String,
    pub priority: Priority,
    pub metadata: TaskMetadata,
}

impl TaskSubmission {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }
}

/// Result of [`Router::route_to_next_agent`].
#[derive(Debug, Clone)]
pub struct RoutedTask {
    pub task: Task,
    pub classification: TaskClassification,
    /// The assignment, or why the task is still pending.
    pub outcome: Result<RouteDecision, String>,
}

// ============================================================================
// Selection
// ============================================================================

/// Rank every eligible agent for a classification, best first.
pub fn rank_agents(
    task_id: &str,
    classification: &TaskClassification,
    state: &SystemState,
    config: &RoutingConfig,
) -> Vec<RouteDecision> {
    let online: Vec<_> = state
        .agents
        .values()
        .filter(|a| a.status.is_online())
        .collect();

    if online.len() < config.min_workers {
        warn!(
            online = online.len(),
            min_workers = config.min_workers,
            "Fewer online agents than configured minimum"
        );
    }

    let mut ranked: Vec<(RouteDecision, u64)> = online
        .into_iter()
        .take(config.max_workers)
        .filter_map(|agent| {
            let load = match agent.status {
                AgentStatus::Busy => state.metrics.load_of(&agent.id).max(1),
                _ => state.metrics.load_of(&agent.id),
            };
            let has_capacity = match agent.status {
                AgentStatus::Idle => true,
                AgentStatus::Busy => load < config.load_threshold,
                AgentStatus::Error | AgentStatus::Offline => false,
            };
            if !has_capacity {
                debug!(agent = %agent.id, %load, status = %agent.status, "Agent at capacity");
                return None;
            }

            let affinity = config.affinity(agent.role, &classification.tags);
            if affinity <= 0.0 {
                return None;
            }

            let score = config.load_weight * load as f64 - config.affinity_weight * affinity;
            Some((
                RouteDecision {
                    task_id: task_id.to_string(),
                    agent_id: agent.id.clone(),
                    role: agent.role,
                    score,
                    affinity,
                    load,
                    rationale: format!(
                        "{} {} (affinity {:.2}, load {}, errors {}) for {} task",
                        agent.role,
                        agent.id,
                        affinity,
                        load,
                        agent.metrics.error_count,
                        classification.task_type
                    ),
                },
                agent.metrics.error_count,
            ))
        })
        .collect();

    ranked.sort_by(|(a, a_errors), (b, b_errors)| {
        a.load
            .cmp(&b.load)
            .then(a.score.total_cmp(&b.score))
            .then(a_errors.cmp(b_errors))
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    });

    ranked.into_iter().map(|(decision, _)| decision).collect()
}

/// Pick the best agent for a task. Pure; never blocks or retries.
pub fn select_agent(
    task_id: &str,
    classification: &TaskClassification,
    state: &SystemState,
    config: &RoutingConfig,
) -> Result<RouteDecision, RoutingError> {
    if let Some(best) = rank_agents(task_id, classification, state, config)
        .into_iter()
        .next()
    {
        return Ok(best);
    }

    let online = state.agents.values().filter(|a| a.status.is_online()).count();
    let reason = if state.agents.is_empty() {
        "no agents registered".to_string()
    } else if online == 0 {
        "all agents are offline".to_string()
    } else if !state
        .agents
        .values()
        .any(|a| config.affinity(a.role, &classification.tags) > 0.0)
    {
        format!("no role covers tags [{}]", classification.tags.join(", "))
    } else {
        "all matching agents are at capacity or in error".to_string()
    };

    Err(RoutingError::NoAvailableAgent {
        task_id: task_id.to_string(),
        reason,
    })
}

/// Format a decision as an instruction for the agent's surface. Pure.
pub fn generate_routing_command(
    decision: &RouteDecision,
    state: &SystemState,
    config: &RoutingConfig,
) -> RoutingCommand {
    let pane = state
        .agent(&decision.agent_id)
        .map(|a| a.target().to_string())
        .unwrap_or_else(|| decision.agent_id.clone());
    let target = if pane.contains(':') {
        pane
    } else {
        format!("{}:{}", config.session, pane)
    };

    let message = match state.task(&decision.task_id) {
        Some(task) => format!(
            "[A2A] Task {} ({}, {} priority): {} | when done run: a2a complete {}",
            task.id, task.task_type, task.priority, task.description, task.id
        ),
        None => format!("[A2A] Task {} assigned to you", decision.task_id),
    };

    RoutingCommand { target, message }
}

// ============================================================================
// Router
// ============================================================================

/// Classifies, selects and assigns.
#[derive(Debug)]
pub struct Router {
    config: RoutingConfig,
    classifier: TaskClassifier,
}

impl Router {
    pub fn new(config: RoutingConfig, classifier: TaskClassifier) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn classify_task(&self, description: &str, metadata: &TaskMetadata) -> TaskClassification {
        self.classifier.classify(description, metadata)
    }

    pub fn select_agent(
        &self,
        task_id: &str,
        classification: &TaskClassification,
        state: &SystemState,
    ) -> Result<RouteDecision, RoutingError> {
        select_agent(task_id, classification, state, &self.config)
    }

    pub fn generate_routing_command(
        &self,
        decision: &RouteDecision,
        state: &SystemState,
    ) -> RoutingCommand {
        generate_routing_command(decision, state, &self.config)
    }

    /// Route an existing pending task and record the assignment.
    ///
    /// If the assignment loses a race with another writer, state is refreshed
    /// and routing is tried once more before [`RoutingError::RoutingConflict`].
    pub fn route_task(
        &self,
        store: &mut StateStore,
        task_id: &str,
    ) -> Result<RouteDecision, RoutingError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        store.refresh()?;

        for attempt in 1..=MAX_ROUTING_ATTEMPTS {
            let task = store
                .get_task(task_id)
                .ok_or_else(|| StateError::TaskNotFound(task_id.to_string()))?;
            if task.status != TaskStatus::Pending {
                if attempt > 1 {
                    break;
                }
                return Err(RoutingError::TaskNotPending {
                    task_id: task_id.to_string(),
                    status: task.status.to_string(),
                });
            }

            let classification = TaskClassification::from_task(task);
            let decision = self.select_agent(task_id, &classification, store.state())?;
            debug!(
                task = task_id,
                agent = %decision.agent_id,
                score = decision.score,
                attempt,
                "Selected agent"
            );

            match store.assign_task(task_id, &decision.agent_id, Some(decision.rationale.clone())) {
                Ok(_) => {
                    info!(
                        task = task_id,
                        agent = %decision.agent_id,
                        role = %decision.role,
                        "Routed task"
                    );
                    #[cfg(feature = "telemetry")]
                    GLOBAL_METRICS.record_operation("router.route_task", start.elapsed());
                    return Ok(decision);
                }
                Err(StateError::InvalidTransition { reason, .. }) => {
                    warn!(task = task_id, attempt, reason = %reason, "Assignment lost a race");
                    store.refresh()?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RoutingError::RoutingConflict {
            task_id: task_id.to_string(),
            attempts: MAX_ROUTING_ATTEMPTS,
        })
    }

    /// Classify a new task, create it, and route it.
    ///
    /// The task is created even when no agent is available; it then stays
    /// pending and `outcome` carries the reason. Conflicts and store errors
    /// are returned as errors.
    pub fn route_to_next_agent(
        &self,
        store: &mut StateStore,
        submission: TaskSubmission,
    ) -> Result<RoutedTask, RoutingError> {
        let classification = self.classify_task(&submission.description, &submission.metadata);

        let mut new_task = NewTask::new(submission.description)
            .with_type(classification.task_type)
            .with_priority(submission.priority)
            .with_complexity(classification.complexity)
            .with_tags(classification.tags.clone());
        new_task.id = submission.id;

        let task = store.create_task(new_task)?;
        let outcome = match self.route_task(store, &task.id) {
            Ok(decision) => Ok(decision),
            Err(RoutingError::NoAvailableAgent { reason, .. }) => {
                info!(task = %task.id, reason = %reason, "Task queued");
                Err(reason)
            }
            Err(e) => return Err(e),
        };

        let task = store.get_task(&task.id).cloned().unwrap_or(task);
        Ok(RoutedTask {
            task,
            classification,
            outcome,
        })
    }

    /// Route pending tasks in queue order until none can be placed.
    ///
    /// Tasks nobody can take are skipped and stay pending.
    pub fn route_pending_tasks(
        &self,
        store: &mut StateStore,
    ) -> Result<Vec<RouteDecision>, RoutingError> {
        store.refresh()?;
        let pending: Vec<String> = store
            .get_pending_tasks()
            .into_iter()
            .map(|t| t.id.clone())
            .collect();

        let mut decisions = Vec::new();
        for task_id in pending {
            match self.route_task(store, &task_id) {
                Ok(decision) => decisions.push(decision),
                Err(RoutingError::NoAvailableAgent { reason, .. }) => {
                    debug!(task = %task_id, reason = %reason, "Left pending");
                }
                Err(RoutingError::TaskNotPending { .. }) => {}
                Err(e @ RoutingError::RoutingConflict { .. }) => {
                    warn!(task = %task_id, error = %e, "Skipping task");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(decisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::classifier::ClassifierRules;
    use crate::state::{AgentSpec, TaskType};

    fn router() -> Router {
        Router::new(
            RoutingConfig::default(),
            TaskClassifier::new(&ClassifierRules::default()).unwrap(),
        )
    }

    fn store(roster: &[(&str, AgentRole)]) -> StateStore {
        let mut store = StateStore::in_memory();
        let specs: Vec<AgentSpec> = roster
            .iter()
            .map(|(id, role)| AgentSpec::new(*id, *role))
            .collect();
        store.create_initial_state(&specs).unwrap();
        store
    }

    fn classification(tags: &[&str]) -> TaskClassification {
        TaskClassification {
            task_type: TaskType::Coding,
            complexity: Default::default(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            matched_rule: None,
        }
    }

    #[test]
    fn test_affinity() {
        let config = RoutingConfig::default();
        let code = vec!["code".to_string(), "implementation".to_string()];
        assert_eq!(config.affinity(AgentRole::Coder, &code), 1.0);
        assert_eq!(config.affinity(AgentRole::Reviewer, &code), 0.5);
        assert_eq!(config.affinity(AgentRole::Writer, &code), 0.0);
        assert_eq!(config.affinity(AgentRole::Generalist, &code), 0.5);
        assert_eq!(config.affinity(AgentRole::Writer, &[]), 1.0);
    }

    #[test]
    fn test_select_prefers_affinity_then_id() {
        let store = store(&[
            ("b-coder", AgentRole::Coder),
            ("a-coder", AgentRole::Coder),
            ("reviewer", AgentRole::Reviewer),
        ]);
        let decision = select_agent(
            "t1",
            &classification(&["code", "implementation"]),
            store.state(),
            &RoutingConfig::default(),
        )
        .unwrap();
        assert_eq!(decision.agent_id, "a-coder");
        assert_eq!(decision.affinity, 1.0);
    }

    #[test]
    fn test_select_no_candidates_reason() {
        let store = store(&[("w", AgentRole::Writer)]);
        let err = select_agent(
            "t1",
            &classification(&["code"]),
            store.state(),
            &RoutingConfig::default(),
        )
        .unwrap_err();
        match err {
            RoutingError::NoAvailableAgent { task_id, reason } => {
                assert_eq!(task_id, "t1");
                assert!(reason.contains("no role covers"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_threshold_and_errors_break_ties() {
        let mut store = store(&[("a", AgentRole::Coder), ("b", AgentRole::Coder)]);
        let config = RoutingConfig {
            load_threshold: 1,
            ..Default::default()
        };

        store
            .create_task(NewTask::new("first").with_id("t1").with_tags(vec!["code".into()]))
            .unwrap();
        store.assign_task("t1", "a", None).unwrap();

        // `a` is busy at the threshold, so only `b` qualifies.
        let decision =
            select_agent("t2", &classification(&["code"]), store.state(), &config).unwrap();
        assert_eq!(decision.agent_id, "b");

        // Equal load and affinity: fewer errors wins over id order.
        store.start_task("t1").unwrap();
        store.fail_task("t1", "boom").unwrap();
        let decision =
            select_agent("t3", &classification(&["code"]), store.state(), &config).unwrap();
        assert_eq!(decision.agent_id, "b");
    }

    #[test]
    fn test_max_workers_bounds_pool() {
        let store = store(&[("a", AgentRole::Writer), ("b", AgentRole::Coder)]);
        let config = RoutingConfig {
            max_workers: 1,
            ..Default::default()
        };
        assert!(select_agent("t", &classification(&["code"]), store.state(), &config).is_err());
    }

    #[test]
    fn test_route_to_next_agent_assigns() {
        let mut store = store(&[("coder", AgentRole::Coder), ("tester", AgentRole::Tester)]);
        let routed = router()
            .route_to_next_agent(&mut store, TaskSubmission::new("Write unit tests for auth"))
            .unwrap();

        let decision = routed.outcome.unwrap();
        assert_eq!(decision.agent_id, "tester");
        assert_eq!(routed.task.status, TaskStatus::Assigned);
        assert_eq!(routed.classification.task_type, TaskType::Testing);
    }

    #[test]
    fn test_route_task_requires_pending() {
        let mut store = store(&[("coder", AgentRole::Coder)]);
        store.create_task(NewTask::new("x").with_id("t1")).unwrap();
        let router = router();
        router.route_task(&mut store, "t1").unwrap();
        assert!(matches!(
            router.route_task(&mut store, "t1"),
            Err(RoutingError::TaskNotPending { .. })
        ));
    }

    #[test]
    fn test_routing_command_format() {
        let mut store = StateStore::in_memory();
        store
            .create_initial_state(&[AgentSpec::new("coder", AgentRole::Coder).with_pane("1.2")])
            .unwrap();
        store
            .create_task(NewTask::new("Fix the bug").with_id("t1"))
            .unwrap();
        let decision = router().route_task(&mut store, "t1").unwrap();

        let command = generate_routing_command(&decision, store.state(), &RoutingConfig::default());
        assert_eq!(command.target, "a2a:1.2");
        assert!(command.message.contains("Task t1"));
        assert!(command.message.contains("Fix the bug"));
    }

    #[test]
    fn test_route_pending_drains_queue() {
        let mut store = store(&[("coder", AgentRole::Coder)]);
        for (id, priority) in [("low", Priority::Low), ("high", Priority::High)] {
            store
                .create_task(NewTask::new(id).with_id(id).with_priority(priority))
                .unwrap();
        }
        let config = RoutingConfig {
            load_threshold: 1,
            ..Default::default()
        };
        let router = Router::new(
            config,
            TaskClassifier::new(&ClassifierRules::default()).unwrap(),
        );

        let decisions = router.route_pending_tasks(&mut store).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].task_id, "high");
        assert_eq!(store.get_pending_tasks()[0].id, "low");
    }
}
