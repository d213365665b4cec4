// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of workspace and resolved configuration,
//! supporting JSON and YAML formats.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RoutingError};
use crate::health::HealthThresholds;
use crate::routing::{ClassifierRules, Router, RoutingConfig, TaskClassifier};
use crate::state::{AgentRole, AgentSpec, BackendKind};

/// Default multiplexer session name.
pub const DEFAULT_SESSION: &str = "a2a";

/// Default state file, relative to the workspace root.
pub const DEFAULT_STATE_FILE: &str = ".a2a/state.json";

/// Default SQLite database, relative to the workspace root.
pub const DEFAULT_STATE_DB: &str = ".a2a/state.db";

/// Workspace configuration for A2A.
/// Can be defined in .a2a.json or .a2a/config.json in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Multiplexer session that holds the agent panes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Path of the persisted state (JSON document or SQLite database)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,

    /// Storage backend (json, sqlite, memory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,

    /// Directory for log files; logs go to stderr only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Log filter directive (e.g. "info", "a2a=debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Seconds between health checks in watch mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_interval: Option<u64>,

    /// Seconds an assigned/running task may sit untouched before it is stalled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stall_timeout: Option<u64>,

    /// Minimum number of online workers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_workers: Option<usize>,

    /// Maximum number of workers considered for routing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    /// Agents registered at bootstrap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<AgentSpec>>,

    /// Router weights and role tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingConfigPartial>,

    /// Classifier rule table (replaces the built-in table)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<ClassifierRules>,
}

/// Router settings (partial, for workspace config).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_threshold: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_weight: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity_weight: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generalist_affinity: Option<f64>,

    /// Per-role capability tags; listed roles replace the defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_tags: Option<BTreeMap<AgentRole, Vec<String>>>,
}

/// Resolved configuration with all values set.
/// This is the merged result of global, workspace, local, and CLI configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub session: String,
    pub state_file: PathBuf,
    pub backend: BackendKind,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub health_interval: u64,
    pub stall_timeout: u64,
    pub min_workers: usize,
    pub max_workers: usize,
    pub agents: Vec<AgentSpec>,
    pub routing: RoutingConfig,
    pub classifier: ClassifierRules,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let routing = RoutingConfig::default();
        Self {
            session: DEFAULT_SESSION.to_string(),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            backend: BackendKind::Json,
            log_dir: None,
            log_level: None,
            health_interval: 30,
            stall_timeout: 30 * 60,
            min_workers: routing.min_workers,
            max_workers: routing.max_workers,
            agents: Vec::new(),
            routing,
            classifier: ClassifierRules::default(),
        }
    }
}

impl ResolvedConfig {
    /// Check values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maxWorkers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.min_workers > self.max_workers {
            return Err(ConfigError::InvalidValue {
                field: "minWorkers".to_string(),
                message: format!(
                    "{} exceeds maxWorkers ({})",
                    self.min_workers, self.max_workers
                ),
            });
        }
        if self.session.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        for (field, value) in [
            ("routing.loadWeight", self.routing.load_weight),
            ("routing.affinityWeight", self.routing.affinity_weight),
            ("routing.generalistAffinity", self.routing.generalist_affinity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be a non-negative number, got {}", value),
                });
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "agents".to_string(),
                    message: format!("duplicate agent id {}", agent.id),
                });
            }
        }
        Ok(())
    }

    /// Make relative paths absolute against `workspace_root`.
    pub fn resolve_paths(&mut self, workspace_root: &Path) {
        if self.state_file.is_relative() {
            self.state_file = workspace_root.join(&self.state_file);
        }
        if let Some(dir) = &self.log_dir {
            if dir.is_relative() {
                self.log_dir = Some(workspace_root.join(dir));
            }
        }
    }

    pub fn health_thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            stall_after: chrono::Duration::seconds(self.stall_timeout as i64),
            min_workers: self.min_workers,
            max_workers: self.max_workers,
        }
    }

    /// Build a router from the routing and classifier sections.
    pub fn build_router(&self) -> Result<Router, RoutingError> {
        let classifier = TaskClassifier::new(&self.classifier)?;
        Ok(Router::new(self.routing.clone(), classifier))
    }
}
