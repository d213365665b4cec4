// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use crate::state::BackendKind;

use super::types::{ResolvedConfig, RoutingConfigPartial, WorkspaceConfig, DEFAULT_STATE_DB};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub session: Option<String>,
    pub state_file: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub min_workers: Option<usize>,
    pub max_workers: Option<usize>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.a2a.local.json)
/// 3. Workspace config (.a2a.json)
/// 4. Global config (~/.a2a/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();
    let mut state_file_set = false;

    for config in [global, workspace, local].into_iter().flatten() {
        state_file_set |= config.state_file.is_some();
        apply_workspace_config(&mut result, &config);
    }

    state_file_set |= cli.state_file.is_some();
    apply_cli_options(&mut result, &cli);

    // A database backend without an explicit path gets its own default file
    if !state_file_set && result.backend == BackendKind::Sqlite {
        result.state_file = PathBuf::from(DEFAULT_STATE_DB);
    }

    // The router reads worker bounds from its own section
    result.routing.min_workers = result.min_workers;
    result.routing.max_workers = result.max_workers;
    result.routing.session = result.session.clone();

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) {
    if let Some(ref session) = config.session {
        result.session = session.clone();
    }

    if let Some(ref state_file) = config.state_file {
        result.state_file = PathBuf::from(state_file);
    }

    if let Some(backend) = config.backend {
        result.backend = backend;
    }

    if let Some(ref log_dir) = config.log_dir {
        result.log_dir = Some(PathBuf::from(log_dir));
    }

    if config.log_level.is_some() {
        result.log_level = config.log_level.clone();
    }

    if let Some(interval) = config.health_interval {
        result.health_interval = interval;
    }

    if let Some(timeout) = config.stall_timeout {
        result.stall_timeout = timeout;
    }

    if let Some(min) = config.min_workers {
        result.min_workers = min;
    }

    if let Some(max) = config.max_workers {
        result.max_workers = max;
    }

    if let Some(ref agents) = config.agents {
        // Later sources redefine agents by id and may add new ones
        for spec in agents {
            match result.agents.iter_mut().find(|a| a.id == spec.id) {
                Some(existing) => *existing = spec.clone(),
                None => result.agents.push(spec.clone()),
            }
        }
    }

    if let Some(ref routing) = config.routing {
        apply_routing(result, routing);
    }

    if let Some(ref classifier) = config.classifier {
        result.classifier = classifier.clone();
    }
}

fn apply_routing(result: &mut ResolvedConfig, routing: &RoutingConfigPartial) {
    if let Some(threshold) = routing.load_threshold {
        result.routing.load_threshold = threshold;
    }
    if let Some(weight) = routing.load_weight {
        result.routing.load_weight = weight;
    }
    if let Some(weight) = routing.affinity_weight {
        result.routing.affinity_weight = weight;
    }
    if let Some(affinity) = routing.generalist_affinity {
        result.routing.generalist_affinity = affinity;
    }
    if let Some(ref role_tags) = routing.role_tags {
        for (role, tags) in role_tags {
            result.routing.role_tags.insert(*role, tags.clone());
        }
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref session) = cli.session {
        result.session = session.clone();
    }
    if let Some(ref state_file) = cli.state_file {
        result.state_file = state_file.clone();
    }
    if let Some(backend) = cli.backend {
        result.backend = backend;
    }
    if cli.log_dir.is_some() {
        result.log_dir = cli.log_dir.clone();
    }
    if cli.log_level.is_some() {
        result.log_level = cli.log_level.clone();
    }
    if let Some(min) = cli.min_workers {
        result.min_workers = min;
    }
    if let Some(max) = cli.max_workers {
        result.max_workers = max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AgentRole, AgentSpec};
    use std::collections::BTreeMap;

    #[test]
    fn test_merge_defaults_only() {
        let config = merge_config(None, None, None, CliOptions::default());
        assert_eq!(config.session, "a2a");
        assert_eq!(config.state_file, PathBuf::from(".a2a/state.json"));
        assert_eq!(config.routing.session, "a2a");
    }

    #[test]
    fn test_merge_precedence() {
        let global = WorkspaceConfig {
            session: Some("global".to_string()),
            min_workers: Some(1),
            max_workers: Some(10),
            ..Default::default()
        };
        let workspace = WorkspaceConfig {
            session: Some("workspace".to_string()),
            max_workers: Some(4),
            ..Default::default()
        };
        let local = WorkspaceConfig {
            session: Some("local".to_string()),
            ..Default::default()
        };
        let cli = CliOptions {
            max_workers: Some(3),
            ..Default::default()
        };

        let config = merge_config(Some(global), Some(workspace), Some(local), cli);
        assert_eq!(config.session, "local");
        assert_eq!(config.min_workers, 1);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.routing.max_workers, 3);
        assert_eq!(config.routing.session, "local");
    }

    #[test]
    fn test_merge_agents_by_id() {
        let workspace = WorkspaceConfig {
            agents: Some(vec![
                AgentSpec::new("a", AgentRole::Coder),
                AgentSpec::new("b", AgentRole::Tester),
            ]),
            ..Default::default()
        };
        let local = WorkspaceConfig {
            agents: Some(vec![
                AgentSpec::new("b", AgentRole::Reviewer),
                AgentSpec::new("c", AgentRole::Writer),
            ]),
            ..Default::default()
        };

        let config = merge_config(None, Some(workspace), Some(local), CliOptions::default());
        let roles: Vec<_> = config.agents.iter().map(|a| (a.id.as_str(), a.role)).collect();
        assert_eq!(
            roles,
            vec![
                ("a", AgentRole::Coder),
                ("b", AgentRole::Reviewer),
                ("c", AgentRole::Writer)
            ]
        );
    }

    #[test]
    fn test_merge_routing_role_tags() {
        let workspace = WorkspaceConfig {
            routing: Some(RoutingConfigPartial {
                affinity_weight: Some(5.0),
                role_tags: Some(BTreeMap::from([(
                    AgentRole::Writer,
                    vec!["docs".to_string()],
                )])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(None, Some(workspace), None, CliOptions::default());
        assert_eq!(config.routing.affinity_weight, 5.0);
        assert_eq!(config.routing.role_tags[&AgentRole::Writer], vec!["docs"]);
        // Other roles keep their defaults
        assert!(config.routing.role_tags.contains_key(&AgentRole::Coder));
    }

    #[test]
    fn test_sqlite_backend_default_path() {
        let cli = CliOptions {
            backend: Some(BackendKind::Sqlite),
            ..Default::default()
        };
        let config = merge_config(None, None, None, cli);
        assert_eq!(config.state_file, PathBuf::from(".a2a/state.db"));

        let cli = CliOptions {
            backend: Some(BackendKind::Sqlite),
            state_file: Some(PathBuf::from("custom.db")),
            ..Default::default()
        };
        let config = merge_config(None, None, None, cli);
        assert_eq!(config.state_file, PathBuf::from("custom.db"));
    }
}
