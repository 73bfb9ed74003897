use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use vitals::aggregator::WindowedAggregator;
use vitals::alerts::{default_rules, Alert, AlertEvaluator, Notifier};
use vitals::clock::{Clock, ManualClock};
use vitals::error::AlertError;
use vitals::events::MetricKind;
use vitals::processor::EventDispatcher;
use vitals::storage::MemoryStore;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Alert>>,
    fail: bool,
}

impl Notifier for RecordingNotifier {
    fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        self.sent.lock().unwrap().push(alert.clone());
        if self.fail {
            Err(AlertError::HttpStatus(502))
        } else {
            Ok(())
        }
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    aggregator: Arc<WindowedAggregator>,
    dispatcher: EventDispatcher,
    evaluator: AlertEvaluator,
    notifier: Arc<RecordingNotifier>,
}

fn harness(notifier: RecordingNotifier) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(MemoryStore::new());
    let aggregator = Arc::new(WindowedAggregator::new(clock.clone()));
    let dispatcher = EventDispatcher::new(store.clone(), clock.clone())
        .with_aggregator(Arc::clone(&aggregator));
    let notifier = Arc::new(notifier);
    let evaluator = AlertEvaluator::new(Arc::clone(&aggregator), notifier.clone(), clock.clone());

    Harness {
        clock,
        store,
        aggregator,
        dispatcher,
        evaluator,
        notifier,
    }
}

fn crash(clock: &ManualClock, app_version: &str, session: &str) -> Value {
    json!({
        "type": "crash",
        "timestamp": clock.now().timestamp_millis(),
        "app_version": app_version,
        "platform": "AndroidPlayer",
        "device_model": "samsung SM-G991B",
        "session_id": session,
        "device_id": format!("device-{}", session),
        "crash_type": "native",
        "fingerprint": "libil2cpp.so+0x1f00",
        "stack": "#00 pc 001f00 libil2cpp.so",
        "breadcrumbs": ["scene:Lobby", "tap:play"]
    })
}

fn batch(events: Vec<Value>) -> String {
    json!({ "app_key": "demo", "events": events }).to_string()
}

#[test]
fn test_crash_spike_flows_from_ingestion_to_alert() {
    let h = harness(RecordingNotifier::default());
    h.evaluator.add_rule(
        default_rules()
            .remove(0)
            .for_app_version("1.4.2"),
    );

    let events: Vec<Value> = (0..15)
        .map(|i| crash(&h.clock, "1.4.2", &format!("s{}", i % 5)))
        .collect();
    let response = h.dispatcher.dispatch_json(&batch(events)).unwrap();
    assert_eq!(response.accepted, 15);
    assert_eq!(response.rejected, 0);

    let stored = h.store.stored();
    assert_eq!(stored.crashes.len(), 15);
    assert_eq!(stored.crashes[0].context.platform, "Android");
    assert_eq!(stored.crashes[0].context.device_model, "SM-G991B");
    assert_eq!(h.aggregator.rate(MetricKind::Crash, "1.4.2"), (15, 5));

    let fired = h.evaluator.evaluate();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].value, 15.0);
    assert_eq!(fired[0].threshold, 10.0);
    assert_eq!(fired[0].message, "Crash Rate Spike threshold exceeded");

    // Within cooldown nothing more is sent even though the count is still high
    h.clock.advance(Duration::seconds(30));
    assert!(h.evaluator.evaluate().is_empty());
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
}

#[test]
fn test_window_expiry_silences_rule_after_cooldown() {
    let h = harness(RecordingNotifier::default());
    h.evaluator.add_rule(
        default_rules()
            .remove(0)
            .for_app_version("2.0.0"),
    );

    let events = (0..12).map(|i| crash(&h.clock, "2.0.0", &format!("s{}", i))).collect();
    h.dispatcher.dispatch_json(&batch(events)).unwrap();
    assert_eq!(h.evaluator.evaluate().len(), 1);

    // Cooldown over, but the burst has left the window
    h.clock.advance(Duration::minutes(6));
    assert_eq!(h.aggregator.sweep(), 1);
    assert_eq!(h.aggregator.rate(MetricKind::Crash, "2.0.0"), (0, 0));
    assert!(h.evaluator.evaluate().is_empty());

    // A fresh burst fires again
    let events = (0..10).map(|i| crash(&h.clock, "2.0.0", &format!("t{}", i))).collect();
    h.dispatcher.dispatch_json(&batch(events)).unwrap();
    assert_eq!(h.evaluator.evaluate().len(), 1);
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
}

#[test]
fn test_rejected_events_never_reach_counters() {
    let h = harness(RecordingNotifier::default());

    let mut stale = crash(&h.clock, "1.0.0", "s1");
    stale["timestamp"] = json!((h.clock.now() - Duration::days(8)).timestamp_millis());
    let mut no_fingerprint = crash(&h.clock, "1.0.0", "s2");
    no_fingerprint["fingerprint"] = json!("");
    let mut no_device = crash(&h.clock, "1.0.0", "s3");
    no_device["device_id"] = json!("");

    let response = h
        .dispatcher
        .dispatch_json(&batch(vec![
            stale,
            no_fingerprint,
            no_device,
            crash(&h.clock, "1.0.0", "s4"),
        ]))
        .unwrap();

    assert_eq!(response.accepted, 1);
    assert_eq!(response.rejected, 3);
    assert_eq!(
        response.errors,
        vec![
            "event 0: invalid timestamp",
            "event 1: missing fingerprint",
            "event 2: missing device_id",
        ]
    );
    assert_eq!(h.aggregator.rate(MetricKind::Crash, "1.0.0"), (1, 1));
    assert_eq!(h.store.stored().crashes.len(), 1);
}

#[test]
fn test_failed_delivery_is_not_retried_within_cooldown() {
    let h = harness(RecordingNotifier {
        fail: true,
        ..Default::default()
    });
    h.evaluator.add_rule(
        default_rules()
            .remove(0)
            .for_app_version("3.1.0"),
    );

    let events = (0..10).map(|i| crash(&h.clock, "3.1.0", &format!("s{}", i))).collect();
    h.dispatcher.dispatch_json(&batch(events)).unwrap();

    assert_eq!(h.evaluator.evaluate().len(), 1);
    h.clock.advance(Duration::minutes(1));
    assert!(h.evaluator.evaluate().is_empty());
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
}
