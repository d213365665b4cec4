// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Text dashboard built from the store's read API.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};

use crate::health::HealthReport;
use crate::state::{AgentStatus, Event, EventPayload, Priority, StateStore, TaskStatus};

fn status_color(status: AgentStatus, text: String) -> ColoredString {
    match status {
        AgentStatus::Idle => text.green(),
        AgentStatus::Busy => text.yellow(),
        AgentStatus::Error => text.red().bold(),
        AgentStatus::Offline => text.dimmed(),
    }
}

fn priority_color(priority: Priority, text: String) -> ColoredString {
    match priority {
        Priority::Critical => text.red().bold(),
        Priority::High => text.yellow(),
        Priority::Normal => text.normal(),
        Priority::Low => text.dimmed(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn format_duration_ms(ms: u64) -> String {
    match ms {
        0 => "-".to_string(),
        ms if ms < 60_000 => format!("{:.1}s", ms as f64 / 1000.0),
        ms if ms < 3_600_000 => format!("{:.1}m", ms as f64 / 60_000.0),
        ms => format!("{:.1}h", ms as f64 / 3_600_000.0),
    }
}

/// One-line description of an event.
pub fn describe_event(event: &Event) -> String {
    let detail = match &event.payload {
        EventPayload::AgentRegistered { agent_id, role, .. } => format!("{} joined as {}", agent_id, role),
        EventPayload::AgentStatusChanged {
            agent_id,
            status,
            reason,
        } => match reason {
            Some(reason) => format!("{} -> {} ({})", agent_id, status, reason),
            None => format!("{} -> {}", agent_id, status),
        },
        EventPayload::TaskCreated {
            task_id,
            task_type,
            priority,
            ..
        } => format!("{} [{}, {}]", task_id, task_type, priority),
        EventPayload::TaskAssigned {
            task_id, agent_id, ..
        } => format!("{} -> {}", task_id, agent_id),
        EventPayload::TaskStarted { task_id } => task_id.clone(),
        EventPayload::TaskCompleted { task_id, .. } => task_id.clone(),
        EventPayload::TaskFailed { task_id, reason } => format!("{}: {}", task_id, reason),
        EventPayload::MetricUpdated { name, value } => format!("{} = {}", name, value),
        EventPayload::SnapshotCreated { snapshot_id } => snapshot_id.clone(),
    };
    format!(
        "#{:<5} {} {:<22} {}",
        event.seq,
        event.timestamp.format("%H:%M:%S"),
        event.kind(),
        detail
    )
}

/// Render the full dashboard.
pub fn render_dashboard(
    store: &StateStore,
    health: Option<&HealthReport>,
    recent: usize,
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{}  {}",
        "A2A Dashboard".bright_blue().bold(),
        format!("{} · seq {} · {}", store.describe(), store.state().last_seq, now.format("%Y-%m-%d %H:%M:%S UTC")).dimmed()
    );

    // Agents
    let _ = writeln!(out, "\n{}", "Agents".bright_cyan().bold());
    let agents = store.get_all_agent_statuses();
    if agents.is_empty() {
        let _ = writeln!(out, "  {}", "no agents registered (run `a2a init`)".dimmed());
    }
    for agent in agents {
        let load = store.get_metrics().load_of(&agent.id);
        let _ = writeln!(
            out,
            "  {:<16} {:<11} {} load {:<2} done {:<4} err {:<3} avg {:<7} {}",
            truncate(&agent.id, 16),
            agent.role.to_string(),
            status_color(agent.status, format!("{:<8}", agent.status.to_string())),
            load,
            agent.metrics.tasks_completed,
            agent.metrics.error_count,
            format_duration_ms(agent.metrics.average_duration_ms),
            agent.current_task.as_deref().unwrap_or("-").dimmed()
        );
    }

    // Pending tasks
    let pending = store.get_pending_tasks();
    let _ = writeln!(
        out,
        "\n{} {}",
        "Pending".bright_cyan().bold(),
        format!("({})", pending.len()).dimmed()
    );
    for task in pending.iter().take(10) {
        let _ = writeln!(
            out,
            "  {:<12} {} {:<13} {}",
            truncate(&task.id, 12),
            priority_color(task.priority, format!("{:<8}", task.priority.to_string())),
            task.task_type.to_string(),
            truncate(&task.description, 60)
        );
    }
    if pending.len() > 10 {
        let _ = writeln!(out, "  {}", format!("… and {} more", pending.len() - 10).dimmed());
    }

    // Active tasks
    let active: Vec<_> = store
        .state()
        .tasks
        .values()
        .filter(|t| t.status.is_active())
        .collect();
    if !active.is_empty() {
        let _ = writeln!(out, "\n{}", "Active".bright_cyan().bold());
        for task in active {
            let status = match task.status {
                TaskStatus::Running => task.status.to_string().yellow(),
                _ => task.status.to_string().normal(),
            };
            let _ = writeln!(
                out,
                "  {:<12} {:<9} {:<16} {}",
                truncate(&task.id, 12),
                status,
                task.assigned_agent.as_deref().unwrap_or("-"),
                truncate(&task.description, 50)
            );
        }
    }

    // Metrics
    let metrics = store.get_metrics();
    let _ = writeln!(out, "\n{}", "Metrics".bright_cyan().bold());
    let _ = writeln!(
        out,
        "  created {}  completed {}  failed {}  error rate {:.1}%  throughput {:.1}/h",
        metrics.tasks_created,
        metrics.tasks_completed.to_string().green(),
        metrics.tasks_failed.to_string().red(),
        metrics.error_rate() * 100.0,
        metrics.throughput_per_hour()
    );
    let _ = writeln!(
        out,
        "  events {} applied, {} rejected  snapshots {}",
        metrics.events_applied, metrics.events_rejected, metrics.snapshots_created
    );
    for (name, value) in &metrics.gauges {
        let _ = writeln!(out, "  {} = {}", name, value);
    }

    if let Some(report) = health {
        let _ = writeln!(out, "\n{}", "Health".bright_cyan().bold());
        if report.is_healthy() {
            let _ = writeln!(out, "  {}", "ok".green());
        }
        for issue in report.issues() {
            let _ = writeln!(out, "  {} {}", "!".red().bold(), issue);
        }
    }

    if recent > 0 {
        let _ = writeln!(out, "\n{}", "Recent events".bright_cyan().bold());
        for event in store.get_recent_events(recent) {
            let _ = writeln!(out, "  {}", describe_event(event).dimmed());
        }
    }

    out
}
