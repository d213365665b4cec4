// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-based event log.
//!
//! Appends run inside `BEGIN IMMEDIATE` transactions, so SQLite's write lock
//! is the exclusive append lock and several processes can share one database.

use std::path::{Path, PathBuf};
#[cfg(feature = "telemetry")]
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};

use crate::error::StateError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::event::{Event, EventPayload};
use super::log::{EventLog, LogHead, Snapshot, SnapshotInfo, SCHEMA_VERSION};
use super::types::SystemState;

/// Event log stored in a SQLite database.
pub struct SqliteLog {
    conn: Connection,
    path: PathBuf,
}

impl SqliteLog {
    /// Open or create an event database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, StateError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StateError::WriteError(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;

        // WAL lets readers proceed while a writer holds the lock
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;",
        )?;

        let mut log = Self {
            conn,
            path: db_path.to_path_buf(),
        };
        log.init_schema()?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("state.sqlite.open", start.elapsed());

        Ok(log)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()?;
        let mut log = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        log.init_schema()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&mut self) -> Result<(), StateError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY,
                timestamp TEXT NOT NULL,
                type TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                log_offset INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                version INTEGER NOT NULL,
                state TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS log_head (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                seq INTEGER NOT NULL,
                timestamp TEXT,
                compacted_through INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_snapshots_offset ON snapshots(log_offset);
            "#,
        )?;

        let current_version: Option<u32> = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(read_error)?;

        match current_version {
            None => {
                self.conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![SCHEMA_VERSION],
                )?;
            }
            Some(version) if version > SCHEMA_VERSION => {
                return Err(StateError::CorruptState(format!(
                    "{} has schema version {}, newer than supported {}",
                    self.path.display(),
                    version,
                    SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO log_head (id, seq, timestamp, compacted_through) VALUES (1, 0, NULL, 0)",
            [],
        )?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StateError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StateError::CorruptState(format!("bad timestamp '{}': {}", raw, e)))
}

/// Failures while reading the log mean the state cannot be trusted, unless
/// another writer merely holds the lock.
fn read_error(err: rusqlite::Error) -> StateError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StateError::from(err),
        _ => StateError::CorruptState(format!("sqlite: {}", err)),
    }
}

fn read_head(conn: &Connection) -> Result<LogHead, StateError> {
    let (seq, timestamp): (i64, Option<String>) = conn.query_row(
        "SELECT seq, timestamp FROM log_head WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(LogHead {
        seq: seq as u64,
        timestamp: timestamp.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn decode_snapshot(
    id: String,
    offset: i64,
    created_at: String,
    version: u32,
    state: String,
) -> Result<Snapshot, StateError> {
    let state: SystemState = serde_json::from_str(&state)
        .map_err(|e| StateError::CorruptState(format!("snapshot {}: {}", id, e)))?;
    Ok(Snapshot {
        offset: offset as u64,
        created_at: parse_timestamp(&created_at)?,
        version,
        state,
        id,
    })
}

type SnapshotRow = (String, i64, String, u32, String);

const SNAPSHOT_COLUMNS: &str = "id, log_offset, created_at, version, state";

impl EventLog for SqliteLog {
    fn append(&mut self, payload: EventPayload) -> Result<Event, StateError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let body = serde_json::to_string(&payload)
            .map_err(|e| StateError::WriteError(format!("Failed to encode event: {}", e)))?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let head = read_head(&tx)?;
        let event = head.next(payload, Utc::now());
        let timestamp = event.timestamp.to_rfc3339();

        tx.execute(
            "INSERT INTO events (seq, timestamp, type, payload) VALUES (?, ?, ?, ?)",
            params![event.seq as i64, timestamp, event.kind(), body],
        )?;
        tx.execute(
            "UPDATE log_head SET seq = ?, timestamp = ? WHERE id = 1",
            params![event.seq as i64, timestamp],
        )?;
        tx.commit()?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("state.sqlite.append", start.elapsed());

        Ok(event)
    }

    fn read_after(&self, offset: u64) -> Result<Vec<Event>, StateError> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, timestamp, payload FROM events WHERE seq > ? ORDER BY seq")
            .map_err(read_error)?;
        let rows = stmt
            .query_map(params![offset as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(read_error)?;

        let mut events = Vec::new();
        for row in rows {
            let (seq, timestamp, payload) = row.map_err(read_error)?;
            let payload: EventPayload = serde_json::from_str(&payload).map_err(|e| {
                StateError::CorruptState(format!("event #{} is unreadable: {}", seq, e))
            })?;
            events.push(Event {
                seq: seq as u64,
                timestamp: parse_timestamp(&timestamp)?,
                payload,
            });
        }
        Ok(events)
    }

    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StateError> {
        let state = serde_json::to_string(&snapshot.state)
            .map_err(|e| StateError::WriteError(format!("Failed to encode snapshot: {}", e)))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshots (id, log_offset, created_at, version, state) VALUES (?, ?, ?, ?, ?)",
            params![
                snapshot.id,
                snapshot.offset as i64,
                snapshot.created_at.to_rfc3339(),
                snapshot.version,
                state,
            ],
        )?;
        Ok(())
    }

    fn load_snapshot(&self, id: &str) -> Result<Option<Snapshot>, StateError> {
        let row: Option<SnapshotRow> = self
            .conn
            .query_row(
                &format!("SELECT {} FROM snapshots WHERE id = ?", SNAPSHOT_COLUMNS),
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()
            .map_err(read_error)?;
        row.map(|(id, offset, created_at, version, state)| {
            decode_snapshot(id, offset, created_at, version, state)
        })
        .transpose()
    }

    fn latest_snapshot(&self) -> Result<Option<Snapshot>, StateError> {
        let row: Option<SnapshotRow> = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM snapshots ORDER BY log_offset DESC, created_at DESC LIMIT 1",
                    SNAPSHOT_COLUMNS
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()
            .map_err(read_error)?;
        row.map(|(id, offset, created_at, version, state)| {
            decode_snapshot(id, offset, created_at, version, state)
        })
        .transpose()
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, StateError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, log_offset, created_at FROM snapshots ORDER BY log_offset, created_at")
            .map_err(read_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(read_error)?;

        let mut infos = Vec::new();
        for row in rows {
            let (id, offset, created_at) = row.map_err(read_error)?;
            infos.push(SnapshotInfo {
                id,
                offset: offset as u64,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(infos)
    }

    fn compacted_through(&self) -> Result<u64, StateError> {
        let through: i64 = self
            .conn
            .query_row(
                "SELECT compacted_through FROM log_head WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .map_err(read_error)?;
        Ok(through as u64)
    }

    fn compact(&mut self, through: u64) -> Result<usize, StateError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute("DELETE FROM events WHERE seq <= ?", params![through as i64])?;
        tx.execute(
            "UPDATE log_head SET compacted_through = MAX(compacted_through, ?) WHERE id = 1",
            params![through as i64],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
