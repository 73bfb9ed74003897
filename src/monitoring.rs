//! Self-monitoring counters for the ingestion and alerting pipeline
//!
//! This module tracks how much work the pipeline has done since startup:
//! batches and events processed, storage failures, alerts fired and
//! notification failures. Counters are lock-free so hot paths can bump them
//! from any thread.

use chrono::{DateTime, Utc};
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Number of batches handed to the dispatcher
    pub batches: u64,
    /// Events accepted across all batches
    pub accepted_events: u64,
    /// Events rejected across all batches
    pub rejected_events: u64,
    /// Per-type storage inserts that failed
    pub insert_failures: u64,
    /// Alerts raised by the evaluator
    pub alerts_fired: u64,
    /// Alerts whose notification could not be delivered
    pub notification_failures: u64,
    /// When this snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Share of processed events that were rejected, as a percentage (0-100)
    pub fn rejection_rate(&self) -> f64 {
        let total = self.accepted_events + self.rejected_events;
        if total == 0 {
            0.0
        } else {
            self.rejected_events as f64 / total as f64 * 100.0
        }
    }
}

/// Running totals shared by the dispatcher and evaluator
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    batches: AtomicU64,
    accepted_events: AtomicU64,
    rejected_events: AtomicU64,
    insert_failures: AtomicU64,
    alerts_fired: AtomicU64,
    notification_failures: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one dispatched batch
    pub fn record_batch(&self, accepted: u64, rejected: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.accepted_events.fetch_add(accepted, Ordering::Relaxed);
        self.rejected_events.fetch_add(rejected, Ordering::Relaxed);
    }

    pub fn record_insert_failure(&self) {
        self.insert_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fired alert and whether its notification was delivered
    pub fn record_alert(&self, delivered: bool) {
        self.alerts_fired.fetch_add(1, Ordering::Relaxed);
        if !delivered {
            self.notification_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            accepted_events: self.accepted_events.load(Ordering::Relaxed),
            rejected_events: self.rejected_events.load(Ordering::Relaxed),
            insert_failures: self.insert_failures.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            timestamp: Utc::now(),
        }
    }

    /// Log a one-line summary of the counters
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            "Pipeline totals: {} batches, {} accepted, {} rejected ({:.1}%), {} insert failures, {} alerts ({} undelivered)",
            snapshot.batches,
            snapshot.accepted_events,
            snapshot.rejected_events,
            snapshot.rejection_rate(),
            snapshot.insert_failures,
            snapshot.alerts_fired,
            snapshot.notification_failures
        );
    }
}
