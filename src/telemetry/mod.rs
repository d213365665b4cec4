// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and timing metrics.
//!
//! - **Tracing**: structured logs to stderr, optionally copied to `<logDir>/a2a.log`
//! - **Metrics**: per-operation latency histograms (`GLOBAL_METRICS`)
//!
//! # Usage
//!
//! ```rust,ignore
//! use a2a::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```
//!
//! Hot paths are instrumented behind the `telemetry` feature:
//!
//! ```rust,ignore
//! #[cfg(feature = "telemetry")]
//! let start = std::time::Instant::now();
//! // ...
//! #[cfg(feature = "telemetry")]
//! GLOBAL_METRICS.record_operation("state.store.log_event", start.elapsed());
//! ```
//!
//! Use `trace` for per-event detail, `info` for state changes, `warn` for
//! rejected events and capacity problems.

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard, LOG_FILE_NAME};
pub use metrics::{Histogram, Metrics, MetricsSnapshot, OperationMetrics, GLOBAL_METRICS};
