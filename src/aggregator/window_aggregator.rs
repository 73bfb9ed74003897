//! Real-time per-version counters with windowed eviction
//!
//! This module provides the WindowedAggregator which counts crash, exception
//! and jank occurrences per app version. Entries that have not been touched
//! within the window are removed by a periodic sweep.

use crate::clock::{Clock, SystemClock};
use crate::events::{MetricKind, Timestamp};
use crate::scheduler::PeriodicTask;
use chrono::Duration;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::io;
use std::ops::ControlFlow;
use std::sync::{Arc, RwLock};

/// Live counters for one app version of one metric kind
#[derive(Debug, Clone, PartialEq)]
pub struct VersionMetricStats {
    pub app_version: String,
    /// Number of recorded occurrences, not deduplicated by session
    pub count: u64,
    pub last_seen: Timestamp,
    /// Distinct sessions that reported an occurrence
    pub sessions: HashSet<String>,
}

impl VersionMetricStats {
    fn new(app_version: &str, now: Timestamp) -> Self {
        Self {
            app_version: app_version.to_string(),
            count: 0,
            last_seen: now,
            sessions: HashSet::new(),
        }
    }
}

/// Read-only view of one entry, for logging and inspection
#[derive(Debug, Clone, PartialEq)]
pub struct VersionMetricSnapshot {
    pub app_version: String,
    pub count: u64,
    pub unique_sessions: usize,
    pub last_seen: Timestamp,
}

type VersionMap = HashMap<String, VersionMetricStats>;

/// Concurrent sliding-window counter store
///
/// Each metric kind has its own reader/writer lock, so `rate` calls run in
/// parallel with each other while `record` and `sweep` take exclusive access
/// to a single kind at a time.
pub struct WindowedAggregator {
    stats: [RwLock<VersionMap>; 3],
    window: Duration,
    sweep_interval: std::time::Duration,
    clock: Arc<dyn Clock>,
}

impl Default for WindowedAggregator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl WindowedAggregator {
    /// Create an aggregator with a 1 minute window swept every 10 seconds
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_window(clock, Duration::minutes(1), std::time::Duration::from_secs(10))
    }

    /// Create an aggregator with a custom window and sweep period
    ///
    /// # Arguments
    ///
    /// * `clock` - Time source for `last_seen` and eviction cutoffs
    /// * `window` - How long an entry stays live after its last occurrence
    /// * `sweep_interval` - Period of the background eviction sweep
    pub fn with_window(
        clock: Arc<dyn Clock>,
        window: Duration,
        sweep_interval: std::time::Duration,
    ) -> Self {
        Self {
            stats: [
                RwLock::new(HashMap::new()),
                RwLock::new(HashMap::new()),
                RwLock::new(HashMap::new()),
            ],
            window,
            sweep_interval,
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        self.sweep_interval
    }

    /// Count one occurrence for `app_version` and remember its session
    pub fn record(&self, kind: MetricKind, app_version: &str, session_id: &str) {
        let now = self.clock.now();
        let mut versions = self.stats[kind.index()]
            .write()
            .unwrap_or_else(|e| e.into_inner());

        let stats = versions
            .entry(app_version.to_string())
            .or_insert_with(|| VersionMetricStats::new(app_version, now));
        stats.count += 1;
        stats.last_seen = now;
        stats.sessions.insert(session_id.to_string());
    }

    /// Current `(count, unique_sessions)` for `app_version`
    ///
    /// Returns `(0, 0)` when nothing is recorded for that version.
    pub fn rate(&self, kind: MetricKind, app_version: &str) -> (u64, usize) {
        let versions = self.stats[kind.index()]
            .read()
            .unwrap_or_else(|e| e.into_inner());

        versions
            .get(app_version)
            .map(|stats| (stats.count, stats.sessions.len()))
            .unwrap_or((0, 0))
    }

    /// Remove entries whose last occurrence is older than the window
    ///
    /// # Returns
    ///
    /// Number of entries evicted across all metric kinds
    pub fn sweep(&self) -> usize {
        // A window reaching past the earliest representable time keeps everything
        let Some(cutoff) = self.clock.now().checked_sub_signed(self.window) else {
            return 0;
        };
        let mut evicted = 0;

        for kind in MetricKind::ALL {
            let mut versions = self.stats[kind.index()]
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let before = versions.len();
            versions.retain(|_, stats| stats.last_seen >= cutoff);
            evicted += before - versions.len();
        }

        if evicted > 0 {
            debug!("Evicted {} stale version counters", evicted);
        }
        evicted
    }

    /// All live entries for a metric kind, ordered by app version
    pub fn snapshot(&self, kind: MetricKind) -> Vec<VersionMetricSnapshot> {
        let versions = self.stats[kind.index()]
            .read()
            .unwrap_or_else(|e| e.into_inner());

        let mut entries: Vec<VersionMetricSnapshot> = versions
            .values()
            .map(|stats| VersionMetricSnapshot {
                app_version: stats.app_version.clone(),
                count: stats.count,
                unique_sessions: stats.sessions.len(),
                last_seen: stats.last_seen,
            })
            .collect();
        entries.sort_by(|a, b| a.app_version.cmp(&b.app_version));
        entries
    }

    /// Run `sweep` in the background every `sweep_interval`
    ///
    /// The task only holds a weak reference, so it winds down on its own once
    /// the aggregator is dropped. Call `stop` on the returned handle to halt
    /// it explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweep thread cannot be spawned.
    pub fn start_sweeper(self: &Arc<Self>) -> io::Result<PeriodicTask> {
        let aggregator = Arc::downgrade(self);
        PeriodicTask::spawn("aggregator-sweep", self.sweep_interval, move || {
            match aggregator.upgrade() {
                Some(aggregator) => {
                    aggregator.sweep();
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            }
        })
    }
}
