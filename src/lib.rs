// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A2A - agent-to-agent task coordination.
//!
//! A pool of worker agents (terminal panes running coding assistants) takes
//! tasks from a shared queue. Every change is an event in an append-only log;
//! the current state is a fold over that log, so several processes can share
//! one log and agree on who owns what.
//!
//! # Architecture
//!
//! - [`state`] - Event log backends, the pure fold and the `StateStore`
//! - [`routing`] - Task classifier and router (agent selection, routing commands)
//! - [`surface`] - Delivery of routing commands to agent panes
//! - [`health`] - Stall and capacity checks over a state
//! - [`dashboard`] - Text rendering of the store's read API
//! - [`config`] - Configuration loading and merging
//! - [`telemetry`] - Tracing setup and operation timings
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use a2a::config::{load_config, CliOptions};
//! use a2a::routing::TaskSubmission;
//! use a2a::state::{open_log, StateStore};
//!
//! let config = load_config(".".as_ref(), CliOptions::default())?;
//! let mut store = StateStore::open(open_log(config.backend, &config.state_file)?)?;
//! store.create_initial_state(&config.agents)?;
//!
//! let router = config.build_router()?;
//! let routed = router.route_to_next_agent(&mut store, TaskSubmission::new("Add login tests"))?;
//! store.save_state()?;
//! ```

pub mod config;
pub mod dashboard;
pub mod error;
pub mod health;
pub mod routing;
pub mod state;
pub mod surface;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use error::{ConfigError, Result, RoutingError, StateError, SurfaceError};
pub use routing::{RouteDecision, Router, RoutingCommand, TaskClassifier, TaskSubmission};
pub use state::{
    Agent, AgentRole, AgentSpec, AgentStatus, BackendKind, Event, EventPayload, NewTask,
    Priority, StateStore, SystemState, Task, TaskStatus, TaskType,
};

/// A2A version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
