/// Threshold alerting over the real-time counters
pub mod evaluator;
pub mod notifier;
pub mod rules;

pub use evaluator::AlertEvaluator;
#[cfg(test)]
pub use notifier::MockNotifier;
pub use notifier::{Notifier, WebhookNotifier, WebhookPayload};
pub use rules::{default_rules, Alert, AlertRule};
