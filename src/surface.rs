// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent execution surface.
//!
//! Agents live in terminal multiplexer panes. The engine never manages those
//! processes; it only hands a formatted [`RoutingCommand`] to a surface.
//! Delivery happens after the assignment is recorded and its failure does not
//! undo the assignment.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::SurfaceError;
use crate::routing::RoutingCommand;

/// Something that can put an instruction in front of an agent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentSurface: Send + Sync {
    /// Surface name for logs.
    fn name(&self) -> &str;

    /// Deliver an instruction to `command.target`.
    async fn deliver(&self, command: &RoutingCommand) -> Result<(), SurfaceError>;
}

/// Delivers instructions by typing them into tmux panes.
#[derive(Debug, Clone)]
pub struct TmuxSurface {
    binary: String,
    timeout: Duration,
}

impl Default for TmuxSurface {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl TmuxSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different tmux executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn tmux(&self, target: &str, args: &[&str]) -> Result<(), SurfaceError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("send-keys")
            .arg("-t")
            .arg(target)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SurfaceError::DeliveryFailed {
                    target: target.to_string(),
                    message: format!("timed out after {}s", self.timeout.as_secs()),
                })
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(SurfaceError::DeliveryFailed {
                target: target.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl AgentSurface for TmuxSurface {
    fn name(&self) -> &str {
        "tmux"
    }

    async fn deliver(&self, command: &RoutingCommand) -> Result<(), SurfaceError> {
        debug!(target = %command.target, "Sending instruction to pane");
        // Literal text first, then Enter as a key name.
        self.tmux(&command.target, &["-l", &command.message]).await?;
        self.tmux(&command.target, &["Enter"]).await?;
        info!(target = %command.target, surface = self.name(), "Instruction delivered");
        Ok(())
    }
}

/// Deliver a batch of commands, collecting failures instead of stopping.
pub async fn deliver_all(
    surface: &dyn AgentSurface,
    commands: &[RoutingCommand],
) -> Vec<(RoutingCommand, SurfaceError)> {
    let mut failures = Vec::new();
    for command in commands {
        if let Err(e) = surface.deliver(command).await {
            failures.push((command.clone(), e));
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn command(target: &str) -> RoutingCommand {
        RoutingCommand {
            target: target.to_string(),
            message: "do the thing".to_string(),
        }
    }

    #[tokio::test]
    async fn test_deliver_all_collects_failures() {
        let mut surface = MockAgentSurface::new();
        surface
            .expect_deliver()
            .with(eq(command("a2a:ok")))
            .times(1)
            .returning(|_| Ok(()));
        surface
            .expect_deliver()
            .with(eq(command("a2a:gone")))
            .times(1)
            .returning(|c| {
                Err(SurfaceError::DeliveryFailed {
                    target: c.target.clone(),
                    message: "can't find pane".to_string(),
                })
            });

        let failures = deliver_all(&surface, &[command("a2a:ok"), command("a2a:gone")]).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.target, "a2a:gone");
    }

    #[tokio::test]
    async fn test_missing_tmux_binary_fails() {
        let surface = TmuxSurface::new().with_binary("a2a-definitely-not-tmux");
        let result = surface.deliver(&command("a2a:0")).await;
        assert!(matches!(result, Err(SurfaceError::IoError(_))));
    }
}
