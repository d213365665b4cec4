// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The append-only event log contract and snapshot types.
//!
//! Backends (memory, JSON file, SQLite) implement [`EventLog`]. Every backend
//! assigns the sequence number and timestamp itself while holding its
//! exclusive append lock, which is what gives all writers one total order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

use super::event::{Event, EventPayload};
use super::types::SystemState;

/// Current snapshot/document schema version.
pub const SCHEMA_VERSION: u32 = 1;

pub(crate) fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// A point-in-time copy of the derived state and the log offset it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    /// Sequence of the last event folded into `state`.
    pub offset: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_schema_version")]
    pub version: u32,
    pub state: SystemState,
}

impl Snapshot {
    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            id: self.id.clone(),
            offset: self.offset,
            created_at: self.created_at,
        }
    }
}

/// Snapshot metadata without the state payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub offset: u64,
    pub created_at: DateTime<Utc>,
}

/// Position of the newest event in a log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHead {
    pub seq: u64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogHead {
    /// Build the next event after this head.
    ///
    /// The timestamp never goes backwards: if the clock reads earlier than the
    /// head, the head's timestamp is reused and the sequence breaks the tie.
    pub fn next(&self, payload: EventPayload, now: DateTime<Utc>) -> Event {
        let timestamp = match self.timestamp {
            Some(last) if now < last => last,
            _ => now,
        };
        Event {
            seq: self.seq + 1,
            timestamp,
            payload,
        }
    }

    /// Advance the head past `event`.
    pub fn advance(&mut self, event: &Event) {
        self.seq = event.seq;
        self.timestamp = Some(event.timestamp);
    }
}

/// Durable, append-only storage for events and snapshots.
pub trait EventLog: Send {
    /// Append an event under the backend's exclusive lock.
    ///
    /// Assigns the next sequence number and a non-decreasing timestamp.
    /// Fails with [`StateError::WriteError`] if nothing could be recorded.
    fn append(&mut self, payload: EventPayload) -> Result<Event, StateError>;

    /// All events with `seq > offset`, in order.
    fn read_after(&self, offset: u64) -> Result<Vec<Event>, StateError>;

    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StateError>;

    fn load_snapshot(&self, id: &str) -> Result<Option<Snapshot>, StateError>;

    /// The snapshot with the highest offset, if any.
    fn latest_snapshot(&self) -> Result<Option<Snapshot>, StateError>;

    /// Snapshot metadata ordered by offset.
    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, StateError>;

    /// Highest sequence removed by compaction (0 if never compacted).
    fn compacted_through(&self) -> Result<u64, StateError>;

    /// Remove events with `seq <= through`. Snapshots are kept.
    ///
    /// Returns the number of events removed.
    fn compact(&mut self, through: u64) -> Result<usize, StateError>;

    /// Persist a materialized view of the derived state, if the backend keeps one.
    fn save_view(&mut self, _state: &SystemState) -> Result<(), StateError> {
        Ok(())
    }

    /// Human-readable location of the log.
    fn describe(&self) -> String;
}

/// Check that events read from a log are well-ordered.
///
/// Sequences must be strictly increasing and start after `after`; timestamps
/// must never decrease. Any violation means the log cannot be trusted.
pub fn validate_sequence(events: &[Event], after: u64) -> Result<(), StateError> {
    let mut prev_seq = after;
    let mut prev_ts: Option<DateTime<Utc>> = None;

    for event in events {
        if event.seq <= prev_seq {
            return Err(StateError::CorruptState(format!(
                "event #{} follows #{} out of order",
                event.seq, prev_seq
            )));
        }
        if let Some(ts) = prev_ts {
            if event.timestamp < ts {
                return Err(StateError::CorruptState(format!(
                    "event #{} has timestamp {} earlier than its predecessor ({})",
                    event.seq, event.timestamp, ts
                )));
            }
        }
        prev_seq = event.seq;
        prev_ts = Some(event.timestamp);
    }

    Ok(())
}
