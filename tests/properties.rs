// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Properties of the fold, the store and the router.

use std::collections::BTreeMap;

use tempfile::TempDir;

use a2a::routing::{
    select_agent, ClassifierRules, Router, RoutingConfig, TaskClassifier, TaskMetadata,
    TaskSubmission,
};
use a2a::state::fold;
use a2a::state::{
    open_log, AgentRole, AgentSpec, AgentStatus, BackendKind, Event, EventLog, EventPayload,
    MemoryLog, NewTask, Priority, StateStore, SystemState, TaskStatus,
};

/// Drive a store through a busy, partly conflicting history.
fn busy_history(log: MemoryLog) -> StateStore {
    let classifier = TaskClassifier::new(&ClassifierRules::default()).unwrap();
    let router = Router::new(RoutingConfig::default(), classifier);
    let mut store = StateStore::new(Box::new(log.clone()));
    store
        .create_initial_state(&[
            AgentSpec::new("coder-1", AgentRole::Coder),
            AgentSpec::new("coder-2", AgentRole::Coder),
            AgentSpec::new("reviewer", AgentRole::Reviewer),
            AgentSpec::new("tester", AgentRole::Tester),
        ])
        .unwrap();

    let descriptions = [
        "Implement the retry endpoint",
        "Review the pull request for the cache",
        "Add integration tests for login",
        "Fix the crash in the scheduler",
        "Write the docs for the CLI",
        "Refactor the parser module",
    ];
    for (i, description) in descriptions.iter().enumerate() {
        let mut submission = TaskSubmission::new(*description);
        submission.id = Some(format!("t{}", i));
        submission.priority = if i % 2 == 0 { Priority::High } else { Priority::Normal };
        router.route_to_next_agent(&mut store, submission).unwrap();
    }

    for task in ["t0", "t1", "t2"] {
        if store.get_task(task).unwrap().status == TaskStatus::Assigned {
            store.start_task(task).unwrap();
        }
    }
    store.complete_task("t0", None).unwrap();
    store.fail_task("t1", "reviewer crashed").unwrap();
    store
        .update_agent_status("reviewer", AgentStatus::Error, Some("pane died".to_string()))
        .unwrap();
    store.update_metrics("queue.depth", 3.0).unwrap();
    router.route_pending_tasks(&mut store).unwrap();

    // A second writer gets in first; the stale assignment lands in the log rejected.
    store.create_task(NewTask::new("Contested").with_id("race")).unwrap();
    let mut rival = StateStore::open(Box::new(log)).unwrap();
    rival.assign_task("race", "coder-2", None).unwrap();
    assert!(store.assign_task("race", "coder-1", None).is_err());
    store
}

fn events_of(log: &MemoryLog) -> Vec<Event> {
    log.read_after(0).unwrap()
}

// ============================================================================
// Fold
// ============================================================================

#[test]
fn test_fold_is_deterministic() {
    let log = MemoryLog::new();
    let store = busy_history(log.clone());
    let events = events_of(&log);

    let mut first = SystemState::default();
    let mut second = SystemState::default();
    let rejected_first = fold::replay(&mut first, &events);
    let rejected_second = fold::replay(&mut second, &events);

    assert_eq!(first, second);
    assert_eq!(rejected_first, rejected_second);
    assert_eq!(&first, store.state());

    // Same log through the wire format.
    let json = serde_json::to_string(&events).unwrap();
    let decoded: Vec<Event> = serde_json::from_str(&json).unwrap();
    let mut third = SystemState::default();
    fold::replay(&mut third, &decoded);
    assert_eq!(first, third);
}

#[test]
fn test_reopened_store_matches_writer() {
    let log = MemoryLog::new();
    let store = busy_history(log.clone());
    let reopened = StateStore::open(Box::new(log)).unwrap();
    assert_eq!(reopened.state(), store.state());
}

#[test]
fn test_no_task_is_assigned_twice() {
    let log = MemoryLog::new();
    let mut a = StateStore::new(Box::new(log.clone()));
    a.create_initial_state(&[
        AgentSpec::new("x", AgentRole::Coder),
        AgentSpec::new("y", AgentRole::Coder),
    ])
    .unwrap();
    a.create_task(NewTask::new("contested").with_id("t1")).unwrap();

    let mut b = StateStore::open(Box::new(log.clone())).unwrap();
    b.assign_task("t1", "y", None).unwrap();
    assert!(a.assign_task("t1", "x", None).is_err());

    // Both assignments are in the log, only the first one counts.
    let assigned: Vec<_> = events_of(&log)
        .into_iter()
        .filter(|e| matches!(e.payload, EventPayload::TaskAssigned { .. }))
        .collect();
    assert_eq!(assigned.len(), 2);

    let mut replayed = SystemState::default();
    let rejected = fold::replay(&mut replayed, &events_of(&log));
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].seq, assigned[1].seq);
    assert_eq!(replayed.task("t1").unwrap().assigned_agent.as_deref(), Some("y"));
    assert_eq!(replayed.metrics.load_of("x"), 0);
    assert_eq!(replayed.metrics.load_of("y"), 1);
}

#[test]
fn test_task_status_never_moves_backwards() {
    let log = MemoryLog::new();
    busy_history(log.clone());
    let mut store = StateStore::open(Box::new(log.clone())).unwrap();

    // Illegal moves are refused without touching the log.
    let before = log.len();
    assert!(store.start_task("t0").is_err());
    assert!(store.assign_task("t1", "coder-1", None).is_err());
    assert!(store.complete_task("t1", None).is_err());
    assert_eq!(log.len(), before);

    let mut state = SystemState::default();
    let mut seen: BTreeMap<String, TaskStatus> = BTreeMap::new();
    for event in events_of(&log) {
        let _ = fold::apply(&mut state, &event);
        for (id, task) in &state.tasks {
            if let Some(previous) = seen.get(id) {
                assert!(
                    task.status.rank() >= previous.rank(),
                    "{} went from {} to {}",
                    id,
                    previous,
                    task.status
                );
                if previous.is_terminal() {
                    assert_eq!(task.status, *previous);
                }
            }
            seen.insert(id.clone(), task.status);
        }
    }
}

#[test]
fn test_event_sequence_and_time_are_monotonic() {
    let log = MemoryLog::new();
    busy_history(log.clone());
    let events = events_of(&log);
    for pair in events.windows(2) {
        assert_eq!(pair[1].seq, pair[0].seq + 1);
        assert!(pair[1].timestamp >= pair[0].timestamp);
    }
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn test_snapshot_round_trip_on_every_backend() {
    let temp = TempDir::new().unwrap();
    for (kind, name) in [
        (BackendKind::Json, "state.json"),
        (BackendKind::Sqlite, "state.db"),
    ] {
        let path = temp.path().join(name);
        let mut store = StateStore::open(open_log(kind, &path).unwrap()).unwrap();
        store
            .create_initial_state(&[AgentSpec::new("coder-1", AgentRole::Coder)])
            .unwrap();
        let task = store.create_task(NewTask::new("Fix the build")).unwrap();
        store.assign_task(&task.id, "coder-1", None).unwrap();
        let info = store.create_snapshot().unwrap();
        assert_eq!(info.offset, store.state().last_seq);
        let at_snapshot = store.state().clone();

        // Events after the snapshot are replayed on top of it.
        store.start_task(&task.id).unwrap();
        let latest = store.state().clone();

        let restored = store.restore_from_snapshot(&info.id).unwrap().clone();
        assert_eq!(restored, latest, "{} restore", kind);

        store.compact_log(&info.id).unwrap();
        let reopened = StateStore::open(open_log(kind, &path).unwrap()).unwrap();
        assert_eq!(reopened.state(), &latest, "{} reopen after compaction", kind);
        assert_eq!(at_snapshot.metrics.snapshots_created, 1);
    }
}

// ============================================================================
// Router
// ============================================================================

#[test]
fn test_router_is_deterministic() {
    let log = MemoryLog::new();
    let store = busy_history(log);
    let classifier = TaskClassifier::new(&ClassifierRules::default()).unwrap();
    let config = RoutingConfig::default();

    let classification = classifier.classify("Fix the flaky login bug", &TaskMetadata::default());
    let first = select_agent("candidate", &classification, store.state(), &config);
    for _ in 0..10 {
        let again = select_agent("candidate", &classification, store.state(), &config);
        match (&first, &again) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
            _ => panic!("selection changed between identical calls"),
        }
    }

    // Registration order does not matter.
    let mut forward = StateStore::in_memory();
    let mut backward = StateStore::in_memory();
    let roster = vec![
        AgentSpec::new("b", AgentRole::Coder),
        AgentSpec::new("a", AgentRole::Coder),
        AgentSpec::new("c", AgentRole::Tester),
    ];
    forward.create_initial_state(&roster).unwrap();
    let reversed: Vec<_> = roster.into_iter().rev().collect();
    backward.create_initial_state(&reversed).unwrap();

    let left = select_agent("t", &classification, forward.state(), &config).unwrap();
    let right = select_agent("t", &classification, backward.state(), &config).unwrap();
    assert_eq!(left.agent_id, right.agent_id);
    assert_eq!(left.agent_id, "a");
}
