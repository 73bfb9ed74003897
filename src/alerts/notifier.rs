use crate::alerts::Alert;
use crate::error::AlertError;
use log::{debug, error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

/// Delivers fired alerts somewhere a human will see them
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Deliver one alert
    ///
    /// # Errors
    ///
    /// Returns an `AlertError` if the alert could not be delivered. Delivery
    /// is attempted once.
    fn send(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// JSON body posted to the alert webhook
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookPayload {
    pub alert_name: String,
    pub alert_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    /// RFC 3339
    pub timestamp: String,
}

impl From<&Alert> for WebhookPayload {
    fn from(alert: &Alert) -> Self {
        Self {
            alert_name: alert.rule.name.clone(),
            alert_type: alert.rule.metric_kind.rule_type().to_string(),
            app_version: alert.app_version.clone(),
            value: alert.value,
            threshold: alert.threshold,
            message: alert.message.clone(),
            timestamp: alert.timestamp.to_rfc3339(),
        }
    }
}

/// Posts alerts as JSON to a webhook URL
///
/// The notifier owns a small current-thread runtime so it can be called from
/// the evaluator's plain OS thread. An empty URL turns every send into a
/// no-op.
pub struct WebhookNotifier {
    url: String,
    client: Client,
    runtime: Runtime,
}

impl WebhookNotifier {
    /// Default request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a notifier posting to `url`
    ///
    /// # Arguments
    ///
    /// * `url` - Webhook endpoint; empty disables delivery
    /// * `timeout` - Upper bound for one POST, including connect
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or its runtime cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).no_proxy().build()?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AlertError::NotificationFailed(format!("HTTP runtime: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
            runtime,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }

    async fn post(&self, payload: &WebhookPayload) -> Result<(), AlertError> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(AlertError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .finish()
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        if !self.is_enabled() {
            debug!("No webhook configured, dropping alert {}", alert.rule.id);
            return Ok(());
        }

        let payload = WebhookPayload::from(alert);
        match self.runtime.block_on(self.post(&payload)) {
            Ok(()) => {
                info!("Alert sent: {}", payload.alert_name);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send alert {}: {}", payload.alert_name, e);
                Err(e)
            }
        }
    }
}
