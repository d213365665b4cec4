// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in various locations.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::state::{AgentRole, AgentSpec};

use super::types::{WorkspaceConfig, DEFAULT_SESSION, DEFAULT_STATE_FILE};

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".a2a.json",
    ".a2a/config.json",
    ".a2a/config.yaml",
    "a2a.config.json",
    "a2a.config.yaml",
];

/// Local config file name (for per-directory overrides).
pub const LOCAL_CONFIG_FILE: &str = ".a2a.local.json";

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".a2a";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.a2a/config.json.
pub fn load_global_config() -> Result<Option<WorkspaceConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration from the workspace root.
///
/// Searches [`CONFIG_FILES`] in order and uses the first one found.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load local configuration from .a2a.local.json.
pub fn load_local_config(workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    let path = workspace_root.join(LOCAL_CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Save workspace configuration to a file.
pub fn save_workspace_config(
    workspace_root: &Path,
    config: &WorkspaceConfig,
    filename: Option<&str>,
) -> Result<PathBuf, ConfigError> {
    let filename = filename.unwrap_or(".a2a.json");
    let path = workspace_root.join(filename);

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;

    Ok(path)
}

/// Initialize a new config file with the example or provided configuration.
///
/// An existing file is left alone.
pub fn init_config(
    workspace_root: &Path,
    config: Option<WorkspaceConfig>,
) -> Result<PathBuf, ConfigError> {
    let path = workspace_root.join(".a2a.json");
    if path.exists() {
        return Ok(path);
    }
    let config = config.unwrap_or_else(get_example_config);
    save_workspace_config(workspace_root, &config, None)
}

/// Find the workspace root by searching for config files.
///
/// Walks up the directory tree from `start` until it finds a directory
/// containing a config file or reaches the filesystem root.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        for filename in CONFIG_FILES {
            if current.join(filename).exists() {
                return Some(current);
            }
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// Get an example configuration: one coordinator and a small mixed pool.
pub fn get_example_config() -> WorkspaceConfig {
    WorkspaceConfig {
        session: Some(DEFAULT_SESSION.to_string()),
        state_file: Some(DEFAULT_STATE_FILE.to_string()),
        log_dir: Some(".a2a/logs".to_string()),
        health_interval: Some(30),
        min_workers: Some(2),
        max_workers: Some(6),
        agents: Some(vec![
            AgentSpec::new("coordinator", AgentRole::Coordinator).with_pane("0"),
            AgentSpec::new("coder-1", AgentRole::Coder).with_pane("1"),
            AgentSpec::new("coder-2", AgentRole::Coder).with_pane("2"),
            AgentSpec::new("reviewer", AgentRole::Reviewer).with_pane("3"),
            AgentSpec::new("tester", AgentRole::Tester).with_pane("4"),
        ]),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BackendKind;
    use tempfile::TempDir;

    #[test]
    fn test_config_files_order() {
        assert_eq!(CONFIG_FILES[0], ".a2a.json");
        assert!(CONFIG_FILES.contains(&".a2a/config.json"));
    }

    #[test]
    fn test_global_config_dir() {
        if let Some(dir) = get_global_config_dir() {
            assert!(dir.ends_with(".a2a"));
        }
    }

    #[test]
    fn test_load_workspace_config_not_found() {
        let temp = TempDir::new().unwrap();
        let result = load_workspace_config(temp.path());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_load_workspace_config_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".a2a.json"),
            r#"{"session": "team", "maxWorkers": 4}"#,
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.session, Some("team".to_string()));
        assert_eq!(config.max_workers, Some(4));
    }

    #[test]
    fn test_load_workspace_config_yaml() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".a2a");
        std::fs::create_dir(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.yaml"),
            "session: swarm\nbackend: sqlite\nagents:\n  - id: c1\n    role: coder\n",
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.session, Some("swarm".to_string()));
        assert_eq!(config.backend, Some(BackendKind::Sqlite));
        assert_eq!(config.agents.unwrap()[0].id, "c1");
    }

    #[test]
    fn test_load_invalid_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".a2a.json"), "{ nope").unwrap();
        assert!(matches!(
            load_workspace_config(temp.path()),
            Err(ConfigError::JsonError(_))
        ));
    }

    #[test]
    fn test_save_workspace_config() {
        let temp = TempDir::new().unwrap();
        let config = WorkspaceConfig {
            session: Some("saved".to_string()),
            ..Default::default()
        };

        let saved_path = save_workspace_config(temp.path(), &config, None).unwrap();
        let content = std::fs::read_to_string(&saved_path).unwrap();
        assert!(content.contains("saved"));
    }

    #[test]
    fn test_find_workspace_root() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&subdir).unwrap();
        std::fs::write(temp.path().join(".a2a.json"), "{}").unwrap();

        let found = find_workspace_root(&subdir);
        assert_eq!(found.unwrap(), temp.path());
    }

    #[test]
    fn test_init_config_keeps_existing() {
        let temp = TempDir::new().unwrap();
        let path = init_config(temp.path(), None).unwrap();
        assert_eq!(path.file_name().unwrap(), ".a2a.json");
        let written = load_config_file(&path).unwrap();
        assert_eq!(written.agents.unwrap().len(), 5);

        std::fs::write(&path, r#"{"session": "mine"}"#).unwrap();
        init_config(temp.path(), None).unwrap();
        assert_eq!(load_config_file(&path).unwrap().session, Some("mine".to_string()));
    }
}
