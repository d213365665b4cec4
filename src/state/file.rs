// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON state-file event log.
//!
//! The whole log lives in one document at a well-known path:
//!
//! ```text
//! {
//!   "version": 1,
//!   "agents": [...], "tasks": [...], "metrics": {...},   // materialized view
//!   "events": [...],                                     // source of truth
//!   "snapshots": [...],
//!   "head": {"seq": 42, "timestamp": "..."},
//!   "compacted_through": 0
//! }
//! ```
//!
//! Writers serialize on an exclusive advisory lock held on a sidecar
//! `<file>.lock`, and every write goes to a temporary file that is renamed
//! over the document, so readers never observe a half-written file.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StateError;

use super::event::{Event, EventPayload};
use super::log::{default_schema_version, EventLog, LogHead, Snapshot, SnapshotInfo};
use super::types::{Agent, SystemMetrics, SystemState, Task};

/// On-disk layout of the state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default = "default_schema_version")]
    pub version: u32,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub metrics: SystemMetrics,
    /// Sequence the materialized view was built at.
    #[serde(default)]
    pub view_seq: u64,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub head: LogHead,
    #[serde(default)]
    pub compacted_through: u64,
}

/// Event log stored in a single JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileLog {
    path: PathBuf,
    lock_path: PathBuf,
}

enum LockMode {
    Shared,
    Exclusive,
}

impl JsonFileLog {
    /// Use the document at `path`, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StateError::WriteError(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document under a shared lock.
    pub fn read_document(&self) -> Result<StateDocument, StateError> {
        self.with_lock(LockMode::Shared, |log| log.read_unlocked())
    }

    fn with_lock<T>(
        &self,
        mode: LockMode,
        f: impl FnOnce(&Self) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let lock_file = match mode {
            LockMode::Shared => self.open_shared_lock()?,
            LockMode::Exclusive => Some(self.open_lock(true).map_err(|e| self.lock_error(e))?),
        };
        let Some(lock_file) = lock_file else {
            // Nobody can have written without creating the lock file.
            debug!(path = %self.lock_path.display(), "Reading state without a lock file");
            return f(self);
        };

        match mode {
            LockMode::Shared => lock_file.lock_shared(),
            LockMode::Exclusive => lock_file.lock_exclusive(),
        }
        .map_err(|e| StateError::WriteError(format!("failed to lock state file: {}", e)))?;

        let result = f(self);
        let _ = lock_file.unlock();
        result
    }

    fn open_lock(&self, create: bool) -> std::io::Result<File> {
        if create {
            OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&self.lock_path)
        } else {
            OpenOptions::new().read(true).open(&self.lock_path)
        }
    }

    /// Readers open the lock read-only and only create it where they may write.
    fn open_shared_lock(&self) -> Result<Option<File>, StateError> {
        match self.open_lock(false) {
            Ok(file) => return Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(self.lock_error(e)),
        }
        match self.open_lock(true) {
            Ok(file) => Ok(Some(file)),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(self.lock_error(e)),
        }
    }

    fn lock_error(&self, e: std::io::Error) -> StateError {
        StateError::WriteError(format!(
            "failed to open lock {}: {}",
            self.lock_path.display(),
            e
        ))
    }

    fn read_unlocked(&self) -> Result<StateDocument, StateError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StateDocument::default()),
            Err(e) => {
                return Err(StateError::CorruptState(format!(
                    "{} is unreadable: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(StateDocument::default());
        }

        let doc: StateDocument = serde_json::from_str(&content).map_err(|e| {
            StateError::CorruptState(format!("{}: {}", self.path.display(), e))
        })?;

        if doc.version > super::log::SCHEMA_VERSION {
            return Err(StateError::CorruptState(format!(
                "{} has schema version {}, newer than supported {}",
                self.path.display(),
                doc.version,
                super::log::SCHEMA_VERSION
            )));
        }

        Ok(doc)
    }

    fn write_unlocked(&self, doc: &StateDocument) -> Result<(), StateError> {
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| StateError::WriteError(format!("failed to serialize state: {}", e)))?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, content).map_err(|e| {
            StateError::WriteError(format!("failed to write {}: {}", tmp_path.display(), e))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            StateError::WriteError(format!("failed to replace {}: {}", self.path.display(), e))
        })?;

        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut StateDocument) -> T) -> Result<T, StateError> {
        self.with_lock(LockMode::Exclusive, |log| {
            let mut doc = log.read_unlocked()?;
            let out = f(&mut doc);
            doc.version = super::log::SCHEMA_VERSION;
            log.write_unlocked(&doc)?;
            Ok(out)
        })
    }
}

impl EventLog for JsonFileLog {
    fn append(&mut self, payload: EventPayload) -> Result<Event, StateError> {
        let event = self.update(|doc| {
            let event = doc.head.next(payload, Utc::now());
            doc.head.advance(&event);
            doc.events.push(event.clone());
            event
        })?;
        debug!(seq = event.seq, kind = event.kind(), path = %self.path.display(), "Appended event");
        Ok(event)
    }

    fn read_after(&self, offset: u64) -> Result<Vec<Event>, StateError> {
        let doc = self.read_document()?;
        Ok(doc.events.into_iter().filter(|e| e.seq > offset).collect())
    }

    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StateError> {
        self.update(|doc| {
            doc.snapshots.retain(|s| s.id != snapshot.id);
            doc.snapshots.push(snapshot.clone());
            doc.snapshots.sort_by_key(|s| s.offset);
        })
    }

    fn load_snapshot(&self, id: &str) -> Result<Option<Snapshot>, StateError> {
        let doc = self.read_document()?;
        Ok(doc.snapshots.into_iter().find(|s| s.id == id))
    }

    fn latest_snapshot(&self) -> Result<Option<Snapshot>, StateError> {
        let doc = self.read_document()?;
        Ok(doc.snapshots.into_iter().max_by_key(|s| s.offset))
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, StateError> {
        let doc = self.read_document()?;
        let mut infos: Vec<SnapshotInfo> = doc.snapshots.iter().map(Snapshot::info).collect();
        infos.sort_by_key(|s| s.offset);
        Ok(infos)
    }

    fn compacted_through(&self) -> Result<u64, StateError> {
        Ok(self.read_document()?.compacted_through)
    }

    fn compact(&mut self, through: u64) -> Result<usize, StateError> {
        self.update(|doc| {
            let before = doc.events.len();
            doc.events.retain(|e| e.seq > through);
            doc.compacted_through = doc.compacted_through.max(through);
            before - doc.events.len()
        })
    }

    fn save_view(&mut self, state: &SystemState) -> Result<(), StateError> {
        self.update(|doc| {
            // Another process may already have written a newer view.
            if state.last_seq < doc.view_seq {
                return;
            }
            doc.agents = state.agents.values().cloned().collect();
            doc.tasks = state.tasks.values().cloned().collect();
            doc.metrics = state.metrics.clone();
            doc.view_seq = state.last_seq;
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
