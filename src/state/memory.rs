// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory event log.
//!
//! Clones share the same log, so several stores in one process (or one test)
//! can append to it and race each other the way separate processes would.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::error::StateError;

use super::event::{Event, EventPayload};
use super::log::{EventLog, LogHead, Snapshot, SnapshotInfo};

#[derive(Debug, Default)]
struct Inner {
    head: LogHead,
    events: Vec<Event>,
    snapshots: Vec<Snapshot>,
    compacted_through: u64,
}

/// Shared in-memory log.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from pre-existing events (used to replay fixtures).
    pub fn from_events(events: Vec<Event>) -> Self {
        let mut head = LogHead::default();
        if let Some(last) = events.last() {
            head.advance(last);
        }
        Self {
            inner: Arc::new(Mutex::new(Inner {
                head,
                events,
                ..Default::default()
            })),
        }
    }

    /// Number of events currently held.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StateError> {
        self.inner
            .lock()
            .map_err(|_| StateError::WriteError("memory log lock poisoned".to_string()))
    }
}

impl EventLog for MemoryLog {
    fn append(&mut self, payload: EventPayload) -> Result<Event, StateError> {
        let mut inner = self.lock()?;
        let event = inner.head.next(payload, Utc::now());
        inner.head.advance(&event);
        inner.events.push(event.clone());
        Ok(event)
    }

    fn read_after(&self, offset: u64) -> Result<Vec<Event>, StateError> {
        let inner = self.lock()?;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.seq > offset)
            .cloned()
            .collect())
    }

    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StateError> {
        let mut inner = self.lock()?;
        inner.snapshots.retain(|s| s.id != snapshot.id);
        inner.snapshots.push(snapshot.clone());
        inner.snapshots.sort_by_key(|s| s.offset);
        Ok(())
    }

    fn load_snapshot(&self, id: &str) -> Result<Option<Snapshot>, StateError> {
        let inner = self.lock()?;
        Ok(inner.snapshots.iter().find(|s| s.id == id).cloned())
    }

    fn latest_snapshot(&self) -> Result<Option<Snapshot>, StateError> {
        let inner = self.lock()?;
        Ok(inner.snapshots.last().cloned())
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, StateError> {
        let inner = self.lock()?;
        Ok(inner.snapshots.iter().map(Snapshot::info).collect())
    }

    fn compacted_through(&self) -> Result<u64, StateError> {
        Ok(self.lock()?.compacted_through)
    }

    fn compact(&mut self, through: u64) -> Result<usize, StateError> {
        let mut inner = self.lock()?;
        let before = inner.events.len();
        inner.events.retain(|e| e.seq > through);
        inner.compacted_through = inner.compacted_through.max(through);
        Ok(before - inner.events.len())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
