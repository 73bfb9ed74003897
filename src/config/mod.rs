//! Runtime configuration loaded from TOML
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration. The webhook URL can also be supplied
//! through the `VITALS_ALERT_WEBHOOK_URL` environment variable, which wins
//! over the file.

use crate::alerts::{default_rules, AlertRule};
use crate::error::ConfigError;
use crate::events::MetricKind;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `alerts.webhook_url`
pub const WEBHOOK_URL_ENV: &str = "VITALS_ALERT_WEBHOOK_URL";

/// Upper bounds for duration settings
pub const MAX_EVENT_AGE_HOURS: u64 = 365 * 24;
pub const MAX_FUTURE_SKEW_MINUTES: u64 = 24 * 60;
pub const MAX_WINDOW_SECONDS: u64 = 24 * 60 * 60;
pub const MAX_INTERVAL_SECONDS: u64 = 24 * 60 * 60;
pub const MAX_COOLDOWN_SECONDS: u64 = 7 * 24 * 60 * 60;
pub const MAX_WEBHOOK_TIMEOUT_SECONDS: u64 = 5 * 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub aggregator: AggregatorConfig,
    pub alerts: AlertsConfig,
}

/// Event acceptance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Oldest accepted event, in hours (default: 168)
    pub max_event_age_hours: u64,
    /// How far ahead of the server clock an event may be, in minutes (default: 60)
    pub max_future_skew_minutes: u64,
    /// Feed accepted crashes, exceptions and janks to the aggregator (default: true)
    pub record_realtime: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_event_age_hours: 168,
            max_future_skew_minutes: 60,
            record_realtime: true,
        }
    }
}

impl IngestConfig {
    pub fn max_event_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_event_age_hours.min(MAX_EVENT_AGE_HOURS) as i64)
    }

    pub fn max_future_skew(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.max_future_skew_minutes.min(MAX_FUTURE_SKEW_MINUTES) as i64)
    }
}

/// Real-time window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub window_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            sweep_interval_seconds: 10,
        }
    }
}

impl AggregatorConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_seconds.min(MAX_WINDOW_SECONDS) as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Alert evaluation and delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Run the evaluator at all (default: false)
    pub enabled: bool,
    /// Webhook endpoint; empty disables delivery
    pub webhook_url: String,
    pub evaluation_interval_seconds: u64,
    pub webhook_timeout_seconds: u64,
    /// Register the built-in spike rules before the configured ones
    pub use_default_rules: bool,
    pub rules: Vec<RuleConfig>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            evaluation_interval_seconds: 10,
            webhook_timeout_seconds: 10,
            use_default_rules: true,
            rules: Vec::new(),
        }
    }
}

impl AlertsConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_seconds)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_seconds)
    }
}

/// One `[[alerts.rules]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    pub name: String,
    pub metric: MetricKind,
    #[serde(default)]
    pub app_version: String,
    pub threshold: f64,
    #[serde(default = "default_rule_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_rule_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_rule_window_seconds() -> u64 {
    60
}

fn default_rule_cooldown_seconds() -> u64 {
    300
}

impl RuleConfig {
    pub fn to_rule(&self) -> AlertRule {
        AlertRule::new(self.id.clone(), self.name.clone(), self.metric, self.threshold)
            .for_app_version(self.app_version.clone())
            .with_window(chrono::Duration::seconds(
                self.window_seconds.min(MAX_WINDOW_SECONDS) as i64,
            ))
            .with_cooldown(chrono::Duration::seconds(
                self.cooldown_seconds.min(MAX_COOLDOWN_SECONDS) as i64,
            ))
    }
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::ValidationError(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}

impl Config {
    /// Load, override from the environment, and validate a config file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::ParseError` if it is not valid TOML for this schema,
    /// and `ConfigError::ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        config.apply_webhook_override(std::env::var(WEBHOOK_URL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string without reading the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a value is out of range.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus the environment override
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_webhook_override(std::env::var(WEBHOOK_URL_ENV).ok());
        config
    }

    /// Replace the webhook URL with a non-empty override
    pub fn apply_webhook_override(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
            debug!("Webhook URL taken from {}", WEBHOOK_URL_ENV);
            self.alerts.webhook_url = url.trim().to_string();
        }
    }

    /// Check that all values are usable
    ///
    /// Duration settings must lie within their `MAX_*` bound; all of them
    /// except the future skew and rule cooldowns must also be non-zero.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        check_range(
            "ingest.max_event_age_hours",
            self.ingest.max_event_age_hours,
            1,
            MAX_EVENT_AGE_HOURS,
        )?;
        check_range(
            "ingest.max_future_skew_minutes",
            self.ingest.max_future_skew_minutes,
            0,
            MAX_FUTURE_SKEW_MINUTES,
        )?;
        check_range(
            "aggregator.window_seconds",
            self.aggregator.window_seconds,
            1,
            MAX_WINDOW_SECONDS,
        )?;
        check_range(
            "aggregator.sweep_interval_seconds",
            self.aggregator.sweep_interval_seconds,
            1,
            MAX_INTERVAL_SECONDS,
        )?;
        check_range(
            "alerts.evaluation_interval_seconds",
            self.alerts.evaluation_interval_seconds,
            1,
            MAX_INTERVAL_SECONDS,
        )?;
        check_range(
            "alerts.webhook_timeout_seconds",
            self.alerts.webhook_timeout_seconds,
            1,
            MAX_WEBHOOK_TIMEOUT_SECONDS,
        )?;

        let url = &self.alerts.webhook_url;
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            return invalid(format!("alerts.webhook_url must be an http(s) URL, got {}", url));
        }

        let mut seen = HashSet::new();
        for rule in &self.alerts.rules {
            if rule.id.trim().is_empty() {
                return invalid("alerts.rules entries need a non-empty id".to_string());
            }
            if !seen.insert(rule.id.as_str()) {
                return invalid(format!("duplicate alert rule id {}", rule.id));
            }
            if !rule.threshold.is_finite() || rule.threshold <= 0.0 {
                return invalid(format!(
                    "alert rule {} threshold must be a positive number, got {}",
                    rule.id, rule.threshold
                ));
            }
            check_range(
                &format!("alert rule {} window_seconds", rule.id),
                rule.window_seconds,
                1,
                MAX_WINDOW_SECONDS,
            )?;
            check_range(
                &format!("alert rule {} cooldown_seconds", rule.id),
                rule.cooldown_seconds,
                0,
                MAX_COOLDOWN_SECONDS,
            )?;
        }

        Ok(())
    }

    /// Rules to register with the evaluator
    ///
    /// Built-in rules come first when enabled; a configured rule with the same
    /// id replaces the built-in one.
    pub fn alert_rules(&self) -> Vec<AlertRule> {
        let configured: Vec<AlertRule> = self.alerts.rules.iter().map(RuleConfig::to_rule).collect();

        let mut rules: Vec<AlertRule> = if self.alerts.use_default_rules {
            default_rules()
                .into_iter()
                .filter(|rule| configured.iter().all(|c| c.id != rule.id))
                .collect()
        } else {
            Vec::new()
        };
        rules.extend(configured);
        rules
    }
}
