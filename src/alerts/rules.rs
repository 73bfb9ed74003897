use crate::events::{MetricKind, Timestamp};
use chrono::Duration;

/// A threshold rule over one real-time metric
///
/// `last_fired` is the only field that changes after registration; the
/// evaluator sets it each time the rule fires.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub metric_kind: MetricKind,
    /// Exact app version bucket to read; empty reads the empty-version bucket
    pub app_version_filter: String,
    pub threshold: f64,
    /// Observation window the rule was written for
    pub window: Duration,
    /// Minimum time between two firings
    pub cooldown: Duration,
    pub last_fired: Option<Timestamp>,
}

impl AlertRule {
    /// Create a rule with the default one-minute window and five-minute cooldown
    ///
    /// # Arguments
    ///
    /// * `id` - Stable identifier of the rule
    /// * `name` - Human readable name, used in alert messages
    /// * `metric_kind` - Which real-time counter the rule watches
    /// * `threshold` - Count at or above which the rule fires
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metric_kind: MetricKind,
        threshold: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metric_kind,
            app_version_filter: String::new(),
            threshold,
            window: Duration::minutes(1),
            cooldown: Duration::minutes(5),
            last_fired: None,
        }
    }

    pub fn for_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version_filter = app_version.into();
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Whether the rule is still cooling down from its last firing at `now`
    pub fn in_cooldown(&self, now: Timestamp) -> bool {
        match self.last_fired {
            Some(last_fired) => now - last_fired < self.cooldown,
            None => false,
        }
    }
}

/// A fired rule, handed to the notifier
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub rule: AlertRule,
    pub app_version: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: Timestamp,
    pub message: String,
}

impl Alert {
    /// Build the alert for `rule` observed at `value`
    pub fn new(rule: &AlertRule, value: f64, timestamp: Timestamp) -> Self {
        Self {
            rule: rule.clone(),
            app_version: rule.app_version_filter.clone(),
            value,
            threshold: rule.threshold,
            timestamp,
            message: format!("{} threshold exceeded", rule.name),
        }
    }
}

/// Rules registered when nothing else is configured
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new("crash_spike", "Crash Rate Spike", MetricKind::Crash, 10.0),
        AlertRule::new(
            "exception_spike",
            "Exception Rate Spike",
            MetricKind::Exception,
            100.0,
        ),
        AlertRule::new("jank_spike", "Jank Rate Spike", MetricKind::Jank, 50.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_default_rules() {
        let rules = default_rules();
        let summary: Vec<_> = rules
            .iter()
            .map(|r| (r.id.as_str(), r.metric_kind, r.threshold))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("crash_spike", MetricKind::Crash, 10.0),
                ("exception_spike", MetricKind::Exception, 100.0),
                ("jank_spike", MetricKind::Jank, 50.0),
            ]
        );
        for rule in &rules {
            assert_eq!(rule.window, Duration::minutes(1));
            assert_eq!(rule.cooldown, Duration::minutes(5));
            assert!(rule.app_version_filter.is_empty());
            assert!(rule.last_fired.is_none());
        }
    }

    #[test]
    fn test_cooldown_boundaries() {
        let now = Utc::now();
        let mut rule = AlertRule::new("r", "Rule", MetricKind::Crash, 1.0);
        assert!(!rule.in_cooldown(now));

        rule.last_fired = Some(now);
        assert!(rule.in_cooldown(now));
        assert!(rule.in_cooldown(now + Duration::minutes(4)));
        assert!(!rule.in_cooldown(now + Duration::minutes(5)));
    }

    #[test]
    fn test_alert_message_and_version() {
        let rule = AlertRule::new("crash_spike", "Crash Rate Spike", MetricKind::Crash, 10.0)
            .for_app_version("2.0.1");
        let now = Utc::now();
        let alert = Alert::new(&rule, 15.0, now);

        assert_eq!(alert.message, "Crash Rate Spike threshold exceeded");
        assert_eq!(alert.app_version, "2.0.1");
        assert_eq!(alert.threshold, 10.0);
        assert_eq!(alert.value, 15.0);
        assert_eq!(alert.timestamp, now);
    }
}
