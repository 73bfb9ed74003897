//! Core telemetry event types
//!
//! This module defines the typed events produced by the dispatcher from raw
//! client payloads, along with the shared context every event carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Declared type of a raw client event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PerfSample,
    Jank,
    Startup,
    SceneLoad,
    Exception,
    Crash,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::PerfSample,
        EventType::Jank,
        EventType::Startup,
        EventType::SceneLoad,
        EventType::Exception,
        EventType::Crash,
    ];

    /// Wire name of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PerfSample => "perf_sample",
            EventType::Jank => "jank",
            EventType::Startup => "startup",
            EventType::SceneLoad => "scene_load",
            EventType::Exception => "exception",
            EventType::Crash => "crash",
        }
    }

    /// Look up an event type by its wire name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of occurrence tracked by the real-time aggregator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Crash,
    Exception,
    Jank,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Crash, MetricKind::Exception, MetricKind::Jank];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Crash => "crash",
            MetricKind::Exception => "exception",
            MetricKind::Jank => "jank",
        }
    }

    /// Alert type reported for rules watching this metric
    pub fn rule_type(&self) -> &'static str {
        match self {
            MetricKind::Crash => "crash_rate",
            MetricKind::Exception => "exception_rate",
            MetricKind::Jank => "jank_rate",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            MetricKind::Crash => 0,
            MetricKind::Exception => 1,
            MetricKind::Jank => 2,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context shared by every telemetry event
///
/// The timestamp is never read from the payload body; the dispatcher fills
/// it in from the envelope after decoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventContext {
    #[serde(skip_deserializing)]
    pub timestamp: Timestamp,
    pub app_version: String,
    pub platform: String,
    pub device_model: String,
    pub os_version: String,
    pub session_id: String,
    pub device_id: String,
    pub scene: String,
    pub build: String,
    pub unity_version: String,
    pub cpu: String,
    pub gpu: String,
    pub ram_class: String,
    pub user_id: String,
    pub level_id: String,
    pub net_type: String,
    pub country: String,
}

/// Periodic performance sample
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerfSample {
    #[serde(flatten)]
    pub context: EventContext,
    #[serde(default)]
    pub fps: f32,
    #[serde(default)]
    pub frame_time_ms: f32,
    #[serde(default)]
    pub main_thread_ms: f32,
    #[serde(default)]
    pub gc_alloc_kb: f32,
    #[serde(default)]
    pub mem_mb: f32,
}

/// Frame hitch reported by the client jank detector
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Jank {
    #[serde(flatten)]
    pub context: EventContext,
    #[serde(default)]
    pub duration_ms: f32,
    #[serde(default)]
    pub max_frame_ms: f32,
    #[serde(default)]
    pub recent_gc_count: u32,
    #[serde(default)]
    pub recent_gc_alloc_kb: f32,
    #[serde(default)]
    pub recent_events: Vec<String>,
}

/// Startup timing, split into phases
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Startup {
    #[serde(flatten)]
    pub context: EventContext,
    /// App launch to engine ready
    #[serde(default)]
    pub phase1_ms: f32,
    /// Engine ready to first frame
    #[serde(default)]
    pub phase2_ms: f32,
    /// First frame to interactive
    #[serde(default)]
    pub tti_ms: f32,
}

/// Scene load timing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SceneLoad {
    #[serde(flatten)]
    pub context: EventContext,
    #[serde(default)]
    pub scene_name: String,
    #[serde(default)]
    pub load_ms: f32,
    #[serde(default)]
    pub activate_ms: f32,
}

/// Non-fatal exception, grouped downstream by fingerprint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Exception {
    #[serde(flatten)]
    pub context: EventContext,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stack: String,
    #[serde(default)]
    pub count: u32,
}

/// Fatal crash, grouped downstream by fingerprint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Crash {
    #[serde(flatten)]
    pub context: EventContext,
    #[serde(default)]
    pub crash_type: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub stack: String,
    #[serde(default)]
    pub breadcrumbs: Vec<String>,
}

/// A decoded event of any supported type
#[derive(Debug, Clone, PartialEq)]
pub enum TypedEvent {
    PerfSample(PerfSample),
    Jank(Jank),
    Startup(Startup),
    SceneLoad(SceneLoad),
    Exception(Exception),
    Crash(Crash),
}

impl TypedEvent {
    /// Decode a raw payload as the given event type
    ///
    /// Unknown fields (including `type` and `timestamp`) are ignored; a known
    /// field with the wrong JSON type is an error.
    pub fn decode(event_type: EventType, payload: &serde_json::Value) -> serde_json::Result<Self> {
        Ok(match event_type {
            EventType::PerfSample => TypedEvent::PerfSample(PerfSample::deserialize(payload)?),
            EventType::Jank => TypedEvent::Jank(Jank::deserialize(payload)?),
            EventType::Startup => TypedEvent::Startup(Startup::deserialize(payload)?),
            EventType::SceneLoad => TypedEvent::SceneLoad(SceneLoad::deserialize(payload)?),
            EventType::Exception => TypedEvent::Exception(Exception::deserialize(payload)?),
            EventType::Crash => TypedEvent::Crash(Crash::deserialize(payload)?),
        })
    }

    pub fn event_type(&self) -> EventType {
        match self {
            TypedEvent::PerfSample(_) => EventType::PerfSample,
            TypedEvent::Jank(_) => EventType::Jank,
            TypedEvent::Startup(_) => EventType::Startup,
            TypedEvent::SceneLoad(_) => EventType::SceneLoad,
            TypedEvent::Exception(_) => EventType::Exception,
            TypedEvent::Crash(_) => EventType::Crash,
        }
    }

    pub fn context(&self) -> &EventContext {
        match self {
            TypedEvent::PerfSample(e) => &e.context,
            TypedEvent::Jank(e) => &e.context,
            TypedEvent::Startup(e) => &e.context,
            TypedEvent::SceneLoad(e) => &e.context,
            TypedEvent::Exception(e) => &e.context,
            TypedEvent::Crash(e) => &e.context,
        }
    }

    pub fn context_mut(&mut self) -> &mut EventContext {
        match self {
            TypedEvent::PerfSample(e) => &mut e.context,
            TypedEvent::Jank(e) => &mut e.context,
            TypedEvent::Startup(e) => &mut e.context,
            TypedEvent::SceneLoad(e) => &mut e.context,
            TypedEvent::Exception(e) => &mut e.context,
            TypedEvent::Crash(e) => &mut e.context,
        }
    }

    /// Real-time metric this event feeds, if any
    pub fn metric_kind(&self) -> Option<MetricKind> {
        match self {
            TypedEvent::Crash(_) => Some(MetricKind::Crash),
            TypedEvent::Exception(_) => Some(MetricKind::Exception),
            TypedEvent::Jank(_) => Some(MetricKind::Jank),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        for event_type in EventType::ALL {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
            assert_eq!(
                serde_json::to_string(&event_type).unwrap(),
                format!("\"{}\"", event_type.as_str())
            );
        }
        assert_eq!(EventType::parse("asset_load"), None);
        assert_eq!(EventType::parse("Crash"), None);
    }

    #[test]
    fn test_metric_kind_rule_types() {
        assert_eq!(MetricKind::Crash.rule_type(), "crash_rate");
        assert_eq!(MetricKind::Exception.rule_type(), "exception_rate");
        assert_eq!(MetricKind::Jank.rule_type(), "jank_rate");
    }

    #[test]
    fn test_decode_perf_sample() {
        let payload = json!({
            "type": "perf_sample",
            "timestamp": 1_700_000_000_000i64,
            "app_version": "1.2.0",
            "platform": "Android",
            "session_id": "s1",
            "device_id": "d1",
            "fps": 58.5,
            "mem_mb": 512
        });

        let event = TypedEvent::decode(EventType::PerfSample, &payload).unwrap();
        let TypedEvent::PerfSample(sample) = event else {
            panic!("expected a perf sample");
        };
        assert_eq!(sample.context.app_version, "1.2.0");
        assert_eq!(sample.fps, 58.5);
        assert_eq!(sample.mem_mb, 512.0);
        assert_eq!(sample.frame_time_ms, 0.0);
        // The payload timestamp is left for the dispatcher to apply
        assert_eq!(sample.context.timestamp, Timestamp::default());
    }

    #[test]
    fn test_decode_crash_with_breadcrumbs() {
        let payload = json!({
            "app_version": "2.0.0",
            "fingerprint": "abc123",
            "crash_type": "native",
            "breadcrumbs": ["menu", "battle"]
        });

        let event = TypedEvent::decode(EventType::Crash, &payload).unwrap();
        assert_eq!(event.event_type(), EventType::Crash);
        assert_eq!(event.metric_kind(), Some(MetricKind::Crash));
        let TypedEvent::Crash(crash) = event else {
            panic!("expected a crash");
        };
        assert_eq!(crash.breadcrumbs, vec!["menu", "battle"]);
        assert_eq!(crash.fingerprint, "abc123");
    }

    #[test]
    fn test_decode_rejects_wrongly_typed_field() {
        let payload = json!({ "fps": "sixty" });
        assert!(TypedEvent::decode(EventType::PerfSample, &payload).is_err());

        let payload = json!({ "app_version": 12 });
        assert!(TypedEvent::decode(EventType::Startup, &payload).is_err());
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let payload = json!("not an event");
        assert!(TypedEvent::decode(EventType::Jank, &payload).is_err());
    }

    #[test]
    fn test_metric_kind_only_for_realtime_types() {
        let startup = TypedEvent::Startup(Startup::default());
        let scene = TypedEvent::SceneLoad(SceneLoad::default());
        let perf = TypedEvent::PerfSample(PerfSample::default());
        assert_eq!(startup.metric_kind(), None);
        assert_eq!(scene.metric_kind(), None);
        assert_eq!(perf.metric_kind(), None);
        assert_eq!(
            TypedEvent::Jank(Jank::default()).metric_kind(),
            Some(MetricKind::Jank)
        );
    }

    #[test]
    fn test_context_mut_updates_inner_event() {
        let mut event = TypedEvent::Exception(Exception::default());
        event.context_mut().platform = "iOS".to_string();
        assert_eq!(event.context().platform, "iOS");
    }
}
