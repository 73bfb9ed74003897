//! Periodic threshold evaluation over the real-time counters
//!
//! Each tick takes a snapshot of the rule list, reads the windowed count for
//! every rule that is not cooling down, and raises an [`Alert`] through the
//! configured [`Notifier`] when the count reaches the rule's threshold.

use crate::aggregator::WindowedAggregator;
use crate::alerts::{Alert, AlertRule, Notifier};
use crate::clock::Clock;
use crate::monitoring::PipelineMetrics;
use crate::scheduler::PeriodicTask;
use log::{debug, warn};
use std::io;
use std::ops::ControlFlow;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Evaluates alert rules against a [`WindowedAggregator`]
pub struct AlertEvaluator {
    rules: RwLock<Vec<AlertRule>>,
    aggregator: Arc<WindowedAggregator>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    metrics: Arc<PipelineMetrics>,
}

impl AlertEvaluator {
    /// Create an evaluator with no rules
    pub fn new(
        aggregator: Arc<WindowedAggregator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            aggregator,
            notifier,
            clock,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register a rule; it is picked up on the next tick
    pub fn add_rule(&self, rule: AlertRule) {
        debug!("Registered alert rule {} ({})", rule.id, rule.metric_kind.rule_type());
        self.rules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(rule);
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Run one evaluation pass and return the alerts it fired
    ///
    /// The rule lock is not held while reading counters or notifying, so
    /// `add_rule` never waits on a slow webhook.
    pub fn evaluate(&self) -> Vec<Alert> {
        let now = self.clock.now();
        let snapshot: Vec<(usize, AlertRule)> = self
            .rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .enumerate()
            .collect();

        let mut fired = Vec::new();
        for (index, rule) in snapshot {
            if rule.in_cooldown(now) {
                continue;
            }

            let (count, _) = self
                .aggregator
                .rate(rule.metric_kind, &rule.app_version_filter);
            let value = count as f64;
            if value < rule.threshold {
                continue;
            }

            let alert = Alert::new(&rule, value, now);
            warn!(
                "Alert {} fired: {} (value {}, threshold {}, app version {:?})",
                rule.id, alert.message, value, rule.threshold, alert.app_version
            );

            // Delivery errors are logged by the notifier; cooldown advances either way
            let delivered = self.notifier.send(&alert).is_ok();
            self.metrics.record_alert(delivered);
            self.mark_fired(index, now);

            fired.push(alert);
        }

        fired
    }

    /// Run [`AlertEvaluator::evaluate`] every `interval` on a background thread
    ///
    /// The task holds a weak reference and ends once the evaluator is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(self: &Arc<Self>, interval: Duration) -> io::Result<PeriodicTask> {
        let evaluator = Arc::downgrade(self);
        PeriodicTask::spawn("alert-evaluator", interval, move || {
            match evaluator.upgrade() {
                Some(evaluator) => {
                    evaluator.evaluate();
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            }
        })
    }

    /// Rules are append-only, so a snapshot index still names the same rule
    fn mark_fired(&self, index: usize, at: crate::events::Timestamp) {
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        if let Some(rule) = rules.get_mut(index) {
            rule.last_fired = Some(at);
        }
    }
}
