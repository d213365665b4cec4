// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process timing metrics for store, router and backend operations.
//!
//! Operations are recorded by name (`state.store.log_event`,
//! `router.route_task`, ...) and reported by `a2a metrics --timings`.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    operations: RwLock<BTreeMap<String, OperationMetrics>>,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record one timed operation.
    pub fn record_operation(&self, name: &str, duration: Duration) {
        // A poisoned lock only means another thread panicked mid-record
        let mut ops = match self.operations.write() {
            Ok(ops) => ops,
            Err(poisoned) => poisoned.into_inner(),
        };
        ops.entry(name.to_string())
            .or_insert_with(OperationMetrics::new)
            .record(duration);
    }

    /// Get metrics for a specific operation.
    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        match self.operations.read() {
            Ok(ops) => ops.get(name).cloned(),
            Err(poisoned) => poisoned.into_inner().get(name).cloned(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = match self.operations.read() {
            Ok(ops) => ops.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        MetricsSnapshot {
            operations,
            uptime: self.uptime(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        match self.operations.write() {
            Ok(mut ops) => ops.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation metrics with a latency histogram.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub histogram: Histogram,
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self {
            count: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            histogram: Histogram::default(),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.histogram.record(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Histogram with fixed buckets for latency tracking.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Bucket boundaries in microseconds.
    buckets: Vec<u64>,
    /// Count per bucket, plus one overflow bucket.
    counts: Vec<u64>,
}

impl Histogram {
    /// Create a histogram with custom bucket boundaries (in microseconds).
    pub fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = vec![0; buckets.len() + 1];
        Self { buckets, counts }
    }

    pub fn record(&mut self, duration: Duration) {
        let micros = duration.as_micros() as u64;
        let bucket_idx = self
            .buckets
            .iter()
            .position(|&b| micros <= b)
            .unwrap_or(self.buckets.len());
        self.counts[bucket_idx] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Approximate percentile as the upper bound of the bucket it falls in.
    pub fn percentile(&self, p: f64) -> Duration {
        let total: u64 = self.counts.iter().sum();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = (total as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let micros = if i < self.buckets.len() {
                    self.buckets[i]
                } else {
                    self.buckets.last().copied().unwrap_or(0) * 10
                };
                return Duration::from_micros(micros);
            }
        }

        Duration::ZERO
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // 100us, 1ms, 10ms, 100ms, 1s, 10s
        Self::with_buckets(vec![100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000])
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub operations: BTreeMap<String, OperationMetrics>,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Operation Timings ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));

        if self.operations.is_empty() {
            report.push_str("No operations recorded.\n");
            return report;
        }

        for (name, metrics) in &self.operations {
            report.push_str(&format!(
                "  {}: {} ops, avg {:.2?}, p50 {:.2?}, p99 {:.2?}, max {:.2?}\n",
                name,
                metrics.count,
                metrics.avg_duration(),
                metrics.histogram.p50(),
                metrics.histogram.p99(),
                metrics.max_duration
            ));
        }

        report
    }
}

/// Record an operation to global metrics.
pub fn record_operation(name: &str, duration: Duration) {
    GLOBAL_METRICS.record_operation(name, duration);
}
