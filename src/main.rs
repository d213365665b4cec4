// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A2A main entry point - CLI over the state store and router.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn, Level};

use a2a::config::{self, CliOptions, ResolvedConfig};
use a2a::dashboard::{describe_event, render_dashboard};
use a2a::error::RoutingError;
use a2a::health::check_health;
use a2a::routing::{RouteDecision, RoutingCommand, TaskMetadata, TaskSubmission};
use a2a::state::{self, AgentStatus, BackendKind, Priority, StateStore, TaskType};
use a2a::surface::{deliver_all, AgentSurface, TmuxSurface};
use a2a::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};

/// A2A version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A2A - agent-to-agent task coordination.
#[derive(Parser)]
#[command(name = "a2a")]
#[command(author, version, about = "Route tasks to a pool of agent panes", long_about = None)]
struct Cli {
    /// Multiplexer session holding the agent panes
    #[arg(long, global = true, env = "A2A_SESSION")]
    session: Option<String>,

    /// State file (JSON document or SQLite database)
    #[arg(long, global = true, env = "A2A_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// State backend (json, sqlite, memory)
    #[arg(long, global = true, env = "A2A_BACKEND")]
    backend: Option<BackendKind>,

    /// Directory for the log file
    #[arg(long, global = true, env = "A2A_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Minimum number of online workers
    #[arg(long, global = true)]
    min_workers: Option<usize>,

    /// Maximum number of workers considered for routing
    #[arg(long, global = true)]
    max_workers: Option<usize>,

    /// Show info-level logs
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for a2a.
#[derive(Subcommand)]
enum Commands {
    /// Write an example config (if none exists) and register the agent roster
    Init,

    /// Show agents, queue and metrics
    Status {
        /// Print the full state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a new task and route it to the best agent
    Submit {
        /// What needs doing
        description: String,

        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        /// Override the classified task type
        #[arg(short = 't', long = "type")]
        task_type: Option<TaskType>,

        /// Extra tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Use this task id instead of a generated one
        #[arg(long)]
        id: Option<String>,

        /// Send the instruction to the chosen agent's pane
        #[arg(short, long)]
        deliver: bool,

        #[arg(long)]
        json: bool,
    },

    /// Route a pending task, or every pending task
    Route {
        #[arg(required_unless_present = "all")]
        task_id: Option<String>,

        #[arg(long, conflicts_with = "task_id")]
        all: bool,

        /// Send instructions to the chosen agents' panes
        #[arg(short, long)]
        deliver: bool,
    },

    /// Mark an assigned task as running
    Start { task_id: String },

    /// Mark a task as completed
    Complete {
        task_id: String,

        #[arg(short, long)]
        result: Option<String>,
    },

    /// Mark a task as failed
    Fail { task_id: String, reason: String },

    /// Change an agent's status
    Agent {
        agent_id: String,

        /// idle, busy, error or offline
        status: AgentStatus,

        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show recent events
    Events {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show system metrics
    Metrics {
        #[arg(long)]
        json: bool,

        /// Also show operation timings for this process
        #[arg(long)]
        timings: bool,
    },

    /// Manage snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Drop the events a snapshot covers
    Compact { snapshot_id: String },

    /// Check for stalled tasks, agents in error and worker capacity
    Health {
        #[arg(long)]
        json: bool,

        /// Re-check every healthInterval seconds
        #[arg(short, long)]
        watch: bool,
    },

    /// Render the dashboard
    Dashboard {
        /// Redraw until interrupted
        #[arg(short, long)]
        watch: bool,

        /// Seconds between redraws (defaults to healthInterval)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Number of recent events to show
        #[arg(short = 'n', long, default_value = "10")]
        events: usize,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Show version information
    Version,
}

/// Snapshot subcommand actions.
#[derive(Subcommand)]
enum SnapshotAction {
    /// Record a snapshot of the current state
    Create,
    /// List snapshots, newest last
    List,
    /// Rebuild state from a snapshot and the events after it
    Restore { snapshot_id: String },
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("a2a {}", VERSION);
        return Ok(());
    }

    let workspace_root = std::env::current_dir()?;
    if let Commands::Init = cli.command {
        let path = config::init_config(&workspace_root, None)?;
        println!("Config file: {}", path.display());
    }

    let cli_options = CliOptions {
        session: cli.session.clone(),
        state_file: cli.state_file.clone(),
        backend: cli.backend,
        log_dir: cli.log_dir.clone(),
        log_level: None,
        min_workers: cli.min_workers,
        max_workers: cli.max_workers,
    };
    let config = config::load_config(&workspace_root, cli_options)?;

    let _guard = init_telemetry(&telemetry_config(&cli, &config))?;

    handle_command(cli.command, &config).await
}

fn telemetry_config(cli: &Cli, config: &ResolvedConfig) -> TelemetryConfig {
    let mut telemetry = if cli.debug {
        TelemetryConfig::development()
    } else if cli.verbose {
        TelemetryConfig::default().with_level(Level::INFO)
    } else {
        TelemetryConfig::default()
    };
    if !cli.debug && !cli.verbose {
        if let Some(level) = &config.log_level {
            telemetry = telemetry.with_filter(level.clone());
        }
    }
    if let Some(dir) = &config.log_dir {
        telemetry = telemetry.with_log_dir(dir.clone());
    }
    telemetry
}

fn open_store(config: &ResolvedConfig) -> anyhow::Result<StateStore> {
    let log = state::open_log(config.backend, &config.state_file)
        .with_context(|| format!("opening state at {}", config.state_file.display()))?;
    let store = StateStore::open(log)?;
    Ok(store)
}

async fn handle_command(command: Commands, config: &ResolvedConfig) -> anyhow::Result<()> {
    match command {
        Commands::Version => {}
        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
        },
        Commands::Init => {
            let mut store = open_store(config)?;
            let registered = store.create_initial_state(&config.agents)?;
            store.save_state()?;
            println!(
                "Registered {} new agent(s), {} total ({})",
                registered,
                store.state().agents.len(),
                store.describe()
            );
        }
        Commands::Status { json } => {
            let store = open_store(config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(store.state())?);
            } else {
                print!("{}", render_dashboard(&store, None, 0, Utc::now()));
            }
        }
        Commands::Submit {
            description,
            priority,
            task_type,
            tags,
            id,
            deliver,
            json,
        } => {
            let router = config.build_router()?;
            let mut store = open_store(config)?;

            let mut submission = TaskSubmission::new(description);
            submission.id = id;
            submission.priority = priority;
            submission.metadata = TaskMetadata {
                type_hint: task_type,
                tags,
                complexity_hint: None,
            };

            let routed = router.route_to_next_agent(&mut store, submission)?;
            store.save_state()?;

            if json {
                let output = serde_json::json!({
                    "task": routed.task,
                    "classification": routed.classification,
                    "decision": routed.outcome.as_ref().ok(),
                    "queuedReason": routed.outcome.as_ref().err(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!(
                    "{} {} ({}, {}, {})",
                    "Created".green(),
                    routed.task.id,
                    routed.classification.task_type,
                    routed.classification.complexity,
                    routed.task.priority
                );
                match &routed.outcome {
                    Ok(decision) => print_decision(decision),
                    Err(reason) => println!("{} {}", "Queued:".yellow(), reason),
                }
            }

            if let (true, Ok(decision)) = (deliver, &routed.outcome) {
                let command = router.generate_routing_command(decision, store.state());
                deliver_commands(&[command]).await;
            }
        }
        Commands::Route {
            task_id,
            all,
            deliver,
        } => {
            let router = config.build_router()?;
            let mut store = open_store(config)?;

            let decisions = if all {
                router.route_pending_tasks(&mut store)?
            } else {
                let task_id = task_id.context("a task id or --all is required")?;
                match router.route_task(&mut store, &task_id) {
                    Ok(decision) => vec![decision],
                    Err(RoutingError::NoAvailableAgent { reason, .. }) => {
                        println!("{} {} stays pending: {}", "Queued:".yellow(), task_id, reason);
                        Vec::new()
                    }
                    Err(e) => return Err(e.into()),
                }
            };
            store.save_state()?;

            for decision in &decisions {
                print_decision(decision);
            }
            if all {
                println!(
                    "Routed {} task(s), {} still pending",
                    decisions.len(),
                    store.get_pending_tasks().len()
                );
            }

            if deliver && !decisions.is_empty() {
                let commands: Vec<RoutingCommand> = decisions
                    .iter()
                    .map(|d| router.generate_routing_command(d, store.state()))
                    .collect();
                deliver_commands(&commands).await;
            }
        }
        Commands::Start { task_id } => {
            let mut store = open_store(config)?;
            let event = store.start_task(&task_id)?;
            store.save_state()?;
            println!("{} {} (#{})", "Started".green(), task_id, event.seq);
        }
        Commands::Complete { task_id, result } => {
            let mut store = open_store(config)?;
            let event = store.complete_task(&task_id, result)?;
            store.save_state()?;
            println!("{} {} (#{})", "Completed".green(), task_id, event.seq);
        }
        Commands::Fail { task_id, reason } => {
            let mut store = open_store(config)?;
            let event = store.fail_task(&task_id, reason)?;
            store.save_state()?;
            println!("{} {} (#{})", "Failed".red(), task_id, event.seq);
        }
        Commands::Agent {
            agent_id,
            status,
            reason,
        } => {
            let mut store = open_store(config)?;
            store.update_agent_status(&agent_id, status, reason)?;
            store.save_state()?;
            println!("{} -> {}", agent_id, status);
        }
        Commands::Events { limit } => {
            let store = open_store(config)?;
            let events = store.get_recent_events(limit);
            if events.is_empty() {
                println!("{}", "No events".dimmed());
            }
            for event in events {
                println!("{}", describe_event(event));
            }
        }
        Commands::Metrics { json, timings } => {
            let store = open_store(config)?;
            let metrics = store.get_metrics();
            if json {
                println!("{}", serde_json::to_string_pretty(metrics)?);
            } else {
                println!("Tasks created:    {}", metrics.tasks_created);
                println!("Tasks completed:  {}", metrics.tasks_completed);
                println!("Tasks failed:     {}", metrics.tasks_failed);
                println!("Error rate:       {:.1}%", metrics.error_rate() * 100.0);
                println!("Throughput:       {:.1}/h", metrics.throughput_per_hour());
                println!(
                    "Events:           {} applied, {} rejected",
                    metrics.events_applied, metrics.events_rejected
                );
                for (agent, load) in &metrics.agent_load {
                    println!("Load {:<12} {}", agent, load);
                }
                for (name, value) in &metrics.gauges {
                    println!("{:<17} {}", format!("{}:", name), value);
                }
            }
            if timings {
                println!("\n{}", GLOBAL_METRICS.snapshot().format_report());
            }
        }
        Commands::Snapshot { action } => {
            let mut store = open_store(config)?;
            match action {
                SnapshotAction::Create => {
                    let info = store.create_snapshot()?;
                    store.save_state()?;
                    println!("{} {} at #{}", "Snapshot".green(), info.id, info.offset);
                }
                SnapshotAction::List => {
                    let snapshots = store.list_snapshots()?;
                    if snapshots.is_empty() {
                        println!("{}", "No snapshots".dimmed());
                    }
                    for info in snapshots {
                        println!(
                            "{}  #{:<6} {}",
                            info.id,
                            info.offset,
                            info.created_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
                SnapshotAction::Restore { snapshot_id } => {
                    let state = store.restore_from_snapshot(&snapshot_id)?;
                    println!(
                        "Restored from {}: {} agents, {} tasks, last event #{}",
                        snapshot_id,
                        state.agents.len(),
                        state.tasks.len(),
                        state.last_seq
                    );
                    store.save_state()?;
                }
            }
        }
        Commands::Compact { snapshot_id } => {
            let mut store = open_store(config)?;
            let removed = store.compact_log(&snapshot_id)?;
            println!("Removed {} event(s)", removed);
        }
        Commands::Health { json, watch } => {
            let mut store = open_store(config)?;
            let thresholds = config.health_thresholds();
            let interval = Duration::from_secs(config.health_interval.max(1));
            loop {
                store.refresh()?;
                let report = check_health(store.state(), &thresholds, Utc::now());
                if json {
                    println!("{}", serde_json::to_string(&report)?);
                } else if report.is_healthy() {
                    println!("{} {} workers online", "ok".green(), report.online_workers);
                } else {
                    for issue in report.issues() {
                        warn!(issue = %issue, "Health check");
                        println!("{} {}", "!".red().bold(), issue);
                    }
                }
                if !watch || !wait_or_interrupt(interval).await {
                    break;
                }
            }
        }
        Commands::Dashboard {
            watch,
            interval,
            events,
        } => {
            let mut store = open_store(config)?;
            let thresholds = config.health_thresholds();
            let interval = Duration::from_secs(interval.unwrap_or(config.health_interval).max(1));
            loop {
                store.refresh()?;
                let now = Utc::now();
                let report = check_health(store.state(), &thresholds, now);
                if watch {
                    // Clear screen and home the cursor
                    print!("\x1B[2J\x1B[H");
                }
                print!("{}", render_dashboard(&store, Some(&report), events, now));
                if !watch || !wait_or_interrupt(interval).await {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_decision(decision: &RouteDecision) {
    println!(
        "{} {} -> {} ({})",
        "Assigned".green(),
        decision.task_id,
        decision.agent_id.bright_white(),
        decision.rationale.dimmed()
    );
}

async fn deliver_commands(commands: &[RoutingCommand]) {
    let surface = TmuxSurface::new();
    let failures = deliver_all(&surface, commands).await;
    for (command, error) in &failures {
        warn!(target = %command.target, error = %error, "Delivery failed");
        eprintln!("{} {}: {}", "Delivery failed".red(), command.target, error);
    }
    info!(
        delivered = commands.len() - failures.len(),
        failed = failures.len(),
        surface = surface.name(),
        "Delivered instructions"
    );
}

/// Sleep for `interval`; returns false if interrupted with Ctrl-C.
async fn wait_or_interrupt(interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = tokio::signal::ctrl_c() => false,
    }
}

