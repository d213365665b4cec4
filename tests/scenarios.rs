// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end routing and state scenarios.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use a2a::error::{RoutingError, StateError};
use a2a::routing::{ClassifierRules, Router, RoutingConfig, TaskClassifier, TaskSubmission};
use a2a::state::{
    open_log, AgentRole, AgentSpec, AgentStatus, BackendKind, Event, EventLog, EventPayload,
    JsonFileLog, MemoryLog, NewTask, Snapshot, SnapshotInfo, StateStore, SystemState, TaskStatus,
};

fn router() -> Router {
    let classifier = TaskClassifier::new(&ClassifierRules::default()).unwrap();
    Router::new(RoutingConfig::default(), classifier)
}

fn store_with(agents: &[(&str, AgentRole)]) -> StateStore {
    let mut store = StateStore::in_memory();
    let roster: Vec<AgentSpec> = agents
        .iter()
        .map(|(id, role)| AgentSpec::new(*id, *role))
        .collect();
    store.create_initial_state(&roster).unwrap();
    store
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_two_idle_agents_affinity_match() {
    let mut store = store_with(&[("coder-1", AgentRole::Coder), ("tester-1", AgentRole::Tester)]);

    let routed = router()
        .route_to_next_agent(&mut store, TaskSubmission::new("Write unit tests for the parser"))
        .unwrap();

    let decision = routed.outcome.unwrap();
    assert_eq!(decision.agent_id, "tester-1");
    assert_eq!(decision.affinity, 1.0);
    assert_eq!(routed.task.status, TaskStatus::Assigned);
    assert_eq!(store.get_agent_status("tester-1"), Some(AgentStatus::Busy));
    assert_eq!(store.get_agent_status("coder-1"), Some(AgentStatus::Idle));
}

#[test]
fn test_all_agents_busy_leaves_task_pending() {
    let mut store = store_with(&[("coder-1", AgentRole::Coder), ("coder-2", AgentRole::Coder)]);
    let router = router();

    // One task each is enough to make both coders busy.
    for i in 0..2 {
        let routed = router
            .route_to_next_agent(&mut store, TaskSubmission::new(format!("Implement feature {}", i)))
            .unwrap();
        assert!(routed.outcome.is_ok());
    }
    assert!(store
        .get_all_agent_statuses()
        .iter()
        .all(|a| a.status == AgentStatus::Busy && store.get_metrics().load_of(&a.id) == 1));

    let routed = router
        .route_to_next_agent(&mut store, TaskSubmission::new("Implement feature 3"))
        .unwrap();
    let reason = routed.outcome.unwrap_err();
    assert!(reason.contains("capacity"), "unexpected reason: {}", reason);
    assert_eq!(routed.task.status, TaskStatus::Pending);
    assert_eq!(store.get_pending_tasks().len(), 1);

    let err = router.route_task(&mut store, &routed.task.id).unwrap_err();
    assert!(matches!(err, RoutingError::NoAvailableAgent { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn test_agents_reported_busy_are_not_selected() {
    let mut store = store_with(&[("a", AgentRole::Coder), ("b", AgentRole::Coder)]);
    for id in ["a", "b"] {
        store
            .update_agent_status(id, AgentStatus::Busy, Some("working outside a2a".to_string()))
            .unwrap();
    }
    store.create_task(NewTask::new("Fix the login bug").with_id("t1")).unwrap();

    let err = router().route_task(&mut store, "t1").unwrap_err();
    match err {
        RoutingError::NoAvailableAgent { task_id, reason } => {
            assert_eq!(task_id, "t1");
            assert!(reason.contains("capacity"), "unexpected reason: {}", reason);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.get_task("t1").unwrap().status, TaskStatus::Pending);
}

#[test]
fn test_idle_agent_beats_busy_better_fit() {
    let mut store = store_with(&[("coder", AgentRole::Coder), ("reviewer", AgentRole::Reviewer)]);
    let config = RoutingConfig {
        load_threshold: 2,
        ..Default::default()
    };
    let router = Router::new(config, TaskClassifier::new(&ClassifierRules::default()).unwrap());
    store
        .create_task(NewTask::new("first").with_id("t1").with_tags(vec!["code".into()]))
        .unwrap();
    store.assign_task("t1", "coder", None).unwrap();

    // Busy coder fits fully, idle reviewer half; lower load still wins.
    store
        .create_task(
            NewTask::new("second")
                .with_id("t2")
                .with_tags(vec!["code".into(), "implementation".into()]),
        )
        .unwrap();
    let decision = router.route_task(&mut store, "t2").unwrap();
    assert_eq!(decision.agent_id, "reviewer");
    assert_eq!(decision.load, 0);
}

#[test]
fn test_second_assignment_is_rejected() {
    let log = MemoryLog::new();
    let mut store = StateStore::new(Box::new(log.clone()));
    store
        .create_initial_state(&[
            AgentSpec::new("a", AgentRole::Coder),
            AgentSpec::new("b", AgentRole::Coder),
        ])
        .unwrap();
    store.create_task(NewTask::new("Fix crash").with_id("t1")).unwrap();
    store.assign_task("t1", "a", None).unwrap();
    let before = log.len();

    let err = store.assign_task("t1", "b", None).unwrap_err();
    assert!(matches!(err, StateError::InvalidTransition { .. }));
    assert_eq!(log.len(), before);
    assert_eq!(store.get_task("t1").unwrap().assigned_agent.as_deref(), Some("a"));
}

#[test]
fn test_completion_sets_timestamp_and_counts() {
    let mut store = store_with(&[("coder-1", AgentRole::Coder)]);
    let task = store.create_task(NewTask::new("Fix the login bug")).unwrap();
    store.assign_task(&task.id, "coder-1", None).unwrap();
    store.start_task(&task.id).unwrap();
    let event = store
        .complete_task(&task.id, Some("patched".to_string()))
        .unwrap();

    let task = store.get_task(&task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.completed_at, Some(event.timestamp));
    assert_eq!(task.result.as_deref(), Some("patched"));

    let agent = store.get_agent("coder-1").unwrap();
    assert_eq!(agent.metrics.tasks_completed, 1);
    assert_eq!(agent.status, AgentStatus::Idle);
    assert!(agent.current_task.is_none());
    assert_eq!(store.get_metrics().tasks_completed, 1);
    assert_eq!(store.get_metrics().load_of("coder-1"), 0);
}

#[test]
fn test_corrupt_log_refuses_to_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    std::fs::write(&path, "{\"events\": [ this is not json").unwrap();

    let result = JsonFileLog::open(&path).and_then(|log| StateStore::open(Box::new(log)));
    match result {
        Err(err) => {
            assert!(matches!(err, StateError::CorruptState(_)));
            assert!(err.is_fatal());
        }
        Ok(_) => panic!("corrupt state file was accepted"),
    }
}

#[test]
fn test_event_missing_required_field_refuses_to_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    {
        let mut store = StateStore::open(Box::new(JsonFileLog::open(&path).unwrap())).unwrap();
        store
            .create_initial_state(&[AgentSpec::new("coder-1", AgentRole::Coder)])
            .unwrap();
        store.create_task(NewTask::new("Fix crash").with_id("t1")).unwrap();
        store.assign_task("t1", "coder-1", None).unwrap();
        store.save_state().unwrap();
    }

    // Strip `task_id` from the assignment event.
    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let events = doc["events"].as_array_mut().unwrap();
    let assigned = events
        .iter_mut()
        .find(|e| e["payload"]["type"] == "task_assigned")
        .unwrap();
    assigned["payload"].as_object_mut().unwrap().remove("task_id");
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let result = JsonFileLog::open(&path).and_then(|log| StateStore::open(Box::new(log)));
    match result {
        Err(err) => assert!(matches!(err, StateError::CorruptState(_)), "got {err:?}"),
        Ok(_) => panic!("event without task_id was accepted"),
    }
}

#[test]
fn test_corrupt_database_refuses_to_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.db");
    std::fs::write(&path, vec![0x5a_u8; 4096]).unwrap();

    let result = open_log(BackendKind::Sqlite, &path).and_then(StateStore::open);
    match result {
        Err(err) => {
            assert!(matches!(err, StateError::CorruptState(_)), "got {err:?}");
            assert!(err.is_fatal());
        }
        Ok(_) => panic!("corrupt database was accepted"),
    }
}

#[test]
fn test_json_file_shared_between_stores() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");

    let mut first = StateStore::open(Box::new(JsonFileLog::open(&path).unwrap())).unwrap();
    first
        .create_initial_state(&[AgentSpec::new("coder-1", AgentRole::Coder)])
        .unwrap();
    first.create_task(NewTask::new("Shared work").with_id("t1")).unwrap();

    let mut second = StateStore::open(Box::new(JsonFileLog::open(&path).unwrap())).unwrap();
    assert_eq!(second.get_pending_tasks().len(), 1);
    second.assign_task("t1", "coder-1", None).unwrap();
    second.save_state().unwrap();

    assert_eq!(first.refresh().unwrap(), 1);
    assert_eq!(first.get_task("t1").unwrap().status, TaskStatus::Assigned);
}

// ============================================================================
// Routing races
// ============================================================================

/// Memory log where a rival writer appends just before each of our assignments.
struct RacingLog {
    inner: MemoryLog,
    rival: Arc<Mutex<VecDeque<EventPayload>>>,
}

impl EventLog for RacingLog {
    fn append(&mut self, payload: EventPayload) -> Result<Event, StateError> {
        if matches!(payload, EventPayload::TaskAssigned { .. }) {
            let next = self.rival.lock().unwrap().pop_front();
            if let Some(rival) = next {
                self.inner.append(rival)?;
            }
        }
        self.inner.append(payload)
    }

    fn read_after(&self, offset: u64) -> Result<Vec<Event>, StateError> {
        self.inner.read_after(offset)
    }

    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StateError> {
        self.inner.save_snapshot(snapshot)
    }

    fn load_snapshot(&self, id: &str) -> Result<Option<Snapshot>, StateError> {
        self.inner.load_snapshot(id)
    }

    fn latest_snapshot(&self) -> Result<Option<Snapshot>, StateError> {
        self.inner.latest_snapshot()
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, StateError> {
        self.inner.list_snapshots()
    }

    fn compacted_through(&self) -> Result<u64, StateError> {
        self.inner.compacted_through()
    }

    fn compact(&mut self, through: u64) -> Result<usize, StateError> {
        self.inner.compact(through)
    }

    fn save_view(&mut self, state: &SystemState) -> Result<(), StateError> {
        self.inner.save_view(state)
    }

    fn describe(&self) -> String {
        "racing".to_string()
    }
}

fn racing_store(rival: &[EventPayload]) -> (StateStore, MemoryLog) {
    let inner = MemoryLog::new();
    let log = RacingLog {
        inner: inner.clone(),
        rival: Arc::new(Mutex::new(rival.iter().cloned().collect())),
    };
    let mut store = StateStore::new(Box::new(log));
    store
        .create_initial_state(&[
            AgentSpec::new("coder-1", AgentRole::Coder),
            AgentSpec::new("coder-2", AgentRole::Coder),
        ])
        .unwrap();
    store.create_task(NewTask::new("Fix crash").with_id("t1")).unwrap();
    (store, inner)
}

fn offline(agent_id: &str) -> EventPayload {
    EventPayload::AgentStatusChanged {
        agent_id: agent_id.to_string(),
        status: AgentStatus::Offline,
        reason: Some("pane closed".to_string()),
    }
}

#[test]
fn test_lost_race_retries_with_fresh_state() {
    // coder-1 wins the tie on id, then goes offline before the assignment lands.
    let (mut store, log) = racing_store(&[offline("coder-1")]);

    let decision = router().route_task(&mut store, "t1").unwrap();
    assert_eq!(decision.agent_id, "coder-2");
    assert_eq!(store.get_task("t1").unwrap().assigned_agent.as_deref(), Some("coder-2"));
    assert_eq!(store.get_metrics().events_rejected, 1);
    // The rejected assignment stays in the log.
    assert_eq!(store.state().last_seq, log.len() as u64);
}

#[test]
fn test_second_lost_race_is_a_conflict() {
    let (mut store, _log) = racing_store(&[offline("coder-1"), offline("coder-2")]);

    let err = router().route_task(&mut store, "t1").unwrap_err();
    assert!(matches!(
        err,
        RoutingError::RoutingConflict { attempts: 2, .. }
    ));
    assert_eq!(store.get_task("t1").unwrap().status, TaskStatus::Pending);
    assert_eq!(store.get_metrics().events_rejected, 2);
}

#[test]
fn test_task_taken_by_rival_is_a_conflict() {
    let (mut store, _log) = racing_store(&[EventPayload::TaskAssigned {
        task_id: "t1".to_string(),
        agent_id: "coder-2".to_string(),
        rationale: None,
    }]);

    let err = router().route_task(&mut store, "t1").unwrap_err();
    assert!(matches!(err, RoutingError::RoutingConflict { .. }));
    // Exactly one assignment took effect.
    assert_eq!(store.get_task("t1").unwrap().assigned_agent.as_deref(), Some("coder-2"));
    assert_eq!(store.get_metrics().load_of("coder-1"), 0);
}
