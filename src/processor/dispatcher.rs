//! Batch dispatch of raw client events
//!
//! The dispatcher takes a batch of raw JSON events, decodes each one by its
//! declared type, normalizes and validates it, and hands the accepted events
//! to the store one collection per type. A bad event is counted and skipped;
//! it never fails the batch.

use crate::aggregator::WindowedAggregator;
use crate::clock::Clock;
use crate::error::{IngestError, StorageError};
use crate::events::{EventType, MetricKind, Timestamp, TypedEvent};
use crate::monitoring::PipelineMetrics;
use crate::processor::{Enricher, Validator};
use crate::storage::{EventStore, EventsByType};
use chrono::{TimeZone, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Body of an ingestion request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventBatch {
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default)]
    pub events: Vec<Value>,
}

/// Outcome of one dispatched batch
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Fields read from every raw event before type-specific decoding
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    /// Unix milliseconds
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Validates, normalizes and stores batches of client events
pub struct EventDispatcher {
    store: Arc<dyn EventStore>,
    validator: Validator,
    enricher: Enricher,
    clock: Arc<dyn Clock>,
    aggregator: Option<Arc<WindowedAggregator>>,
    metrics: Arc<PipelineMetrics>,
}

impl EventDispatcher {
    /// Create a dispatcher with default validation limits
    ///
    /// Accepted events are only stored; call [`EventDispatcher::with_aggregator`]
    /// to also feed the real-time counters.
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            validator: Validator::new(Arc::clone(&clock)),
            enricher: Enricher::new(),
            clock,
            aggregator: None,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Record accepted crashes, exceptions and janks in `aggregator`
    pub fn with_aggregator(mut self, aggregator: Arc<WindowedAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Decode a request body and dispatch its events
    ///
    /// # Errors
    ///
    /// Returns `IngestError::InvalidBody` if the body is not a JSON object
    /// with an `events` array. Problems with individual events are reported
    /// in the response instead.
    pub fn dispatch_json(&self, body: &str) -> Result<IngestResponse, IngestError> {
        let batch: EventBatch = serde_json::from_str(body)?;
        if let Some(app_key) = &batch.app_key {
            debug!("Batch of {} events from app key {}", batch.events.len(), app_key);
        }
        Ok(self.dispatch(&batch.events))
    }

    /// Process a batch of raw events
    pub fn dispatch(&self, events: &[Value]) -> IngestResponse {
        if events.is_empty() {
            self.metrics.record_batch(0, 0);
            return IngestResponse::default();
        }

        let mut accepted = EventsByType::default();
        let mut errors = Vec::new();

        for (index, raw) in events.iter().enumerate() {
            match self.process_event(raw) {
                Ok(event) => accepted.push(event),
                Err(reason) => {
                    debug!("Rejected event {}: {}", index, reason);
                    errors.push(format!("event {}: {}", index, reason));
                }
            }
        }

        let accepted_count = accepted.len();
        let rejected_count = errors.len();

        self.record_realtime(&accepted);
        self.persist(accepted);

        self.metrics
            .record_batch(accepted_count as u64, rejected_count as u64);
        info!(
            "Ingested events: {} accepted, {} rejected",
            accepted_count, rejected_count
        );

        IngestResponse {
            accepted: accepted_count,
            rejected: rejected_count,
            errors,
        }
    }

    /// Turn one raw event into a validated typed event
    fn process_event(&self, raw: &Value) -> Result<TypedEvent, String> {
        let envelope = EventEnvelope::deserialize(raw).map_err(|_| "invalid format".to_string())?;

        let event_type = EventType::parse(&envelope.event_type)
            .ok_or_else(|| format!("unknown event type \"{}\"", envelope.event_type))?;

        let timestamp = self.resolve_timestamp(envelope.timestamp)?;

        let mut event = TypedEvent::decode(event_type, raw)
            .map_err(|e| format!("malformed {} payload: {}", event_type, e))?;

        let context = event.context_mut();
        context.timestamp = timestamp;
        context.platform = self.enricher.normalize_platform(&context.platform);
        context.device_model = self.enricher.normalize_device_model(&context.device_model);

        self.validator
            .validate(&event)
            .map_err(|e| e.to_string())?;
        Ok(event)
    }

    /// A zero or missing timestamp means "now"
    fn resolve_timestamp(&self, millis: Option<i64>) -> Result<Timestamp, String> {
        match millis {
            None | Some(0) => Ok(self.clock.now()),
            Some(millis) => Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| "invalid timestamp".to_string()),
        }
    }

    fn record_realtime(&self, accepted: &EventsByType) {
        let Some(aggregator) = &self.aggregator else {
            return;
        };

        for crash in &accepted.crashes {
            aggregator.record(
                MetricKind::Crash,
                &crash.context.app_version,
                &crash.context.session_id,
            );
        }
        for exception in &accepted.exceptions {
            aggregator.record(
                MetricKind::Exception,
                &exception.context.app_version,
                &exception.context.session_id,
            );
        }
        for jank in &accepted.janks {
            aggregator.record(
                MetricKind::Jank,
                &jank.context.app_version,
                &jank.context.session_id,
            );
        }
    }

    /// Insert each non-empty collection; failures are logged, not returned
    fn persist(&self, accepted: EventsByType) {
        let EventsByType {
            perf_samples,
            janks,
            startups,
            scene_loads,
            exceptions,
            crashes,
        } = accepted;

        self.insert(EventType::PerfSample, perf_samples, |e| {
            self.store.insert_perf_samples(e)
        });
        self.insert(EventType::Jank, janks, |e| self.store.insert_janks(e));
        self.insert(EventType::Startup, startups, |e| self.store.insert_startups(e));
        self.insert(EventType::SceneLoad, scene_loads, |e| {
            self.store.insert_scene_loads(e)
        });
        self.insert(EventType::Exception, exceptions, |e| {
            self.store.insert_exceptions(e)
        });
        self.insert(EventType::Crash, crashes, |e| self.store.insert_crashes(e));
    }

    fn insert<T>(
        &self,
        event_type: EventType,
        events: Vec<T>,
        insert: impl FnOnce(Vec<T>) -> Result<(), StorageError>,
    ) {
        if events.is_empty() {
            return;
        }

        let count = events.len();
        if let Err(e) = insert(events) {
            error!("Failed to insert {} {} events: {}", count, event_type, e);
            self.metrics.record_insert_failure();
        }
    }
}
