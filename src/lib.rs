/// Error types for ingestion, storage, alerting and configuration
pub mod error;

/// Time source shared by validation, aggregation and alerting
pub mod clock;

/// Telemetry event types
pub mod events;

/// Batch validation, normalization and dispatch
pub mod processor;

/// Storage sinks for accepted events
pub mod storage;

/// Windowed real-time counters
pub mod aggregator;

/// Alert rules, evaluation and webhook delivery
pub mod alerts;

/// Configuration management
pub mod config;

/// Pipeline self-monitoring counters
pub mod monitoring;

/// Background loop runner
pub mod scheduler;

// Re-export commonly used types
pub use aggregator::WindowedAggregator;
pub use alerts::{AlertEvaluator, Notifier, WebhookNotifier};
pub use clock::{Clock, SystemClock};
pub use error::{AlertError, ConfigError, IngestError, StorageError, ValidationError};
pub use processor::{EventDispatcher, IngestResponse};
