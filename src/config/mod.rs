// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for A2A.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.a2a/config.json
//! - Workspace config: .a2a.json, .a2a/config.json, or a2a.config.json (YAML also accepted)
//! - Local config: .a2a.local.json (gitignored, for personal overrides)
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > local > workspace > global > defaults).

mod loader;
mod merger;
mod types;

// Re-export public types
pub use loader::{
    find_workspace_root, get_example_config, get_global_config_dir, get_global_config_path,
    init_config, load_config_file, load_global_config, load_local_config, load_workspace_config,
    save_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{
    ResolvedConfig, RoutingConfigPartial, WorkspaceConfig, DEFAULT_SESSION, DEFAULT_STATE_DB,
    DEFAULT_STATE_FILE,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a workspace.
///
/// This is the main entry point for configuration loading. Relative paths in
/// the result are resolved against `workspace_root`.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;
    let local = load_local_config(workspace_root)?;

    let mut config = merge_config(global, workspace, local, cli_options);
    config.resolve_paths(workspace_root);
    config.validate()?;
    Ok(config)
}
