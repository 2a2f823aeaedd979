//! Fan-out telemetry
//!
//! Every layer of every round produces exactly one [`LayerReport`]. Sinks
//! implement [`LayerTelemetry`]; [`FederationMetrics`] aggregates reports
//! into monotonic counters.
//!
//! Counters use Relaxed ordering; they are observed, never synchronized on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::view::LayerId;

/// Outcome of one layer within a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    Succeeded,
    Failed,
    TimedOut,
}

impl LayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Which fan-out round a report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    /// The request's own fan-out, or a direct parallel query
    Primary,
    /// The single backfill round
    Backfill,
}

impl RoundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Backfill => "backfill",
        }
    }
}

/// Per-layer, per-round observation
#[derive(Debug, Clone, PartialEq)]
pub struct LayerReport {
    pub layer: LayerId,
    pub round: RoundKind,
    pub elapsed: Duration,
    pub rows: usize,
    pub status: LayerStatus,
}

/// Sink for per-layer reports
pub trait LayerTelemetry: Send + Sync {
    fn record_layer(&self, report: &LayerReport);

    /// A round finished; `ok` is false when it was aborted
    fn record_round(&self, round: RoundKind, ok: bool) {
        let _ = (round, ok);
    }
}

/// Telemetry sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTelemetry;

impl LayerTelemetry for NoOpTelemetry {
    fn record_layer(&self, _: &LayerReport) {}
}

/// Counter-based telemetry sink
#[derive(Debug, Default)]
pub struct FederationMetrics {
    rounds_completed: AtomicU64,
    rounds_failed: AtomicU64,
    backfill_rounds: AtomicU64,
    layer_successes: AtomicU64,
    layer_failures: AtomicU64,
    layer_timeouts: AtomicU64,
    rows_fetched: AtomicU64,
    layer_millis: AtomicU64,
}

impl FederationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
            rounds_failed: self.rounds_failed.load(Ordering::Relaxed),
            backfill_rounds: self.backfill_rounds.load(Ordering::Relaxed),
            layer_successes: self.layer_successes.load(Ordering::Relaxed),
            layer_failures: self.layer_failures.load(Ordering::Relaxed),
            layer_timeouts: self.layer_timeouts.load(Ordering::Relaxed),
            rows_fetched: self.rows_fetched.load(Ordering::Relaxed),
            layer_millis: self.layer_millis.load(Ordering::Relaxed),
        }
    }
}

impl LayerTelemetry for FederationMetrics {
    fn record_layer(&self, report: &LayerReport) {
        let counter = match report.status {
            LayerStatus::Succeeded => &self.layer_successes,
            LayerStatus::Failed => &self.layer_failures,
            LayerStatus::TimedOut => &self.layer_timeouts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.rows_fetched.fetch_add(report.rows as u64, Ordering::Relaxed);
        self.layer_millis
            .fetch_add(report.elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    fn record_round(&self, round: RoundKind, ok: bool) {
        if ok {
            self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rounds_failed.fetch_add(1, Ordering::Relaxed);
        }
        if round == RoundKind::Backfill {
            self.backfill_rounds.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`FederationMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub rounds_completed: u64,
    pub rounds_failed: u64,
    pub backfill_rounds: u64,
    pub layer_successes: u64,
    pub layer_failures: u64,
    pub layer_timeouts: u64,
    pub rows_fetched: u64,
    pub layer_millis: u64,
}

impl MetricsSnapshot {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn report(status: LayerStatus, rows: usize) -> LayerReport {
        LayerReport {
            layer: LayerId::new("s", "c"),
            round: RoundKind::Primary,
            elapsed: Duration::from_millis(5),
            rows,
            status,
        }
    }

    #[test]
    fn test_new_metrics_are_zero() {
        assert_eq!(FederationMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_layer_reports_counted_by_status() {
        let metrics = FederationMetrics::new();
        metrics.record_layer(&report(LayerStatus::Succeeded, 3));
        metrics.record_layer(&report(LayerStatus::Succeeded, 2));
        metrics.record_layer(&report(LayerStatus::Failed, 0));
        metrics.record_layer(&report(LayerStatus::TimedOut, 0));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.layer_successes, 2);
        assert_eq!(snapshot.layer_failures, 1);
        assert_eq!(snapshot.layer_timeouts, 1);
        assert_eq!(snapshot.rows_fetched, 5);
        assert_eq!(snapshot.layer_millis, 20);
    }

    #[test]
    fn test_rounds_counted() {
        let metrics = FederationMetrics::new();
        metrics.record_round(RoundKind::Primary, true);
        metrics.record_round(RoundKind::Backfill, true);
        metrics.record_round(RoundKind::Primary, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rounds_completed, 2);
        assert_eq!(snapshot.rounds_failed, 1);
        assert_eq!(snapshot.backfill_rounds, 1);
    }

    #[test]
    fn test_snapshot_json() {
        let metrics = FederationMetrics::new();
        metrics.record_layer(&report(LayerStatus::Succeeded, 7));
        let json = metrics.snapshot().to_json();
        assert_eq!(json["rows_fetched"], 7);
        assert_eq!(json["layer_successes"], 1);
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(FederationMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_layer(&report(LayerStatus::Succeeded, 1));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().layer_successes, 800);
    }
}
