//! Storage collaborator interface
//!
//! Durable storage lives outside this crate. The dispatcher hands each
//! accepted per-type collection to an [`EventStore`] exactly once per batch.

use crate::error::StorageError;
use crate::events::{Crash, EventType, Exception, Jank, PerfSample, SceneLoad, Startup, TypedEvent};
use log::info;
use std::collections::HashSet;
use std::sync::Mutex;

/// Batch insert operations, one per typed event collection
///
/// Implementations must treat an empty collection as a successful no-op.
#[cfg_attr(test, mockall::automock)]
pub trait EventStore: Send + Sync {
    fn insert_perf_samples(&self, events: Vec<PerfSample>) -> Result<(), StorageError>;
    fn insert_janks(&self, events: Vec<Jank>) -> Result<(), StorageError>;
    fn insert_startups(&self, events: Vec<Startup>) -> Result<(), StorageError>;
    fn insert_scene_loads(&self, events: Vec<SceneLoad>) -> Result<(), StorageError>;
    fn insert_exceptions(&self, events: Vec<Exception>) -> Result<(), StorageError>;
    fn insert_crashes(&self, events: Vec<Crash>) -> Result<(), StorageError>;
}

/// Accepted events partitioned by type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventsByType {
    pub perf_samples: Vec<PerfSample>,
    pub janks: Vec<Jank>,
    pub startups: Vec<Startup>,
    pub scene_loads: Vec<SceneLoad>,
    pub exceptions: Vec<Exception>,
    pub crashes: Vec<Crash>,
}

impl EventsByType {
    /// Append an event to the collection matching its type
    pub fn push(&mut self, event: TypedEvent) {
        match event {
            TypedEvent::PerfSample(e) => self.perf_samples.push(e),
            TypedEvent::Jank(e) => self.janks.push(e),
            TypedEvent::Startup(e) => self.startups.push(e),
            TypedEvent::SceneLoad(e) => self.scene_loads.push(e),
            TypedEvent::Exception(e) => self.exceptions.push(e),
            TypedEvent::Crash(e) => self.crashes.push(e),
        }
    }

    /// Number of events of the given type
    pub fn count(&self, event_type: EventType) -> usize {
        match event_type {
            EventType::PerfSample => self.perf_samples.len(),
            EventType::Jank => self.janks.len(),
            EventType::Startup => self.startups.len(),
            EventType::SceneLoad => self.scene_loads.len(),
            EventType::Exception => self.exceptions.len(),
            EventType::Crash => self.crashes.len(),
        }
    }

    pub fn len(&self) -> usize {
        EventType::ALL.iter().map(|t| self.count(*t)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Store that keeps every inserted event in memory
///
/// Useful for tests and dry runs. Individual tables can be made to fail with
/// [`MemoryStore::fail_on`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: Mutex<EventsByType>,
    failing: Mutex<HashSet<EventType>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later insert of `event_type` fail
    pub fn fail_on(&self, event_type: EventType) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event_type);
    }

    /// Copy of everything stored so far
    pub fn stored(&self) -> EventsByType {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn check(&self, event_type: EventType) -> Result<(), StorageError> {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(&event_type) {
            return Err(StorageError::Unavailable(format!(
                "{} table is failing",
                event_type
            )));
        }
        Ok(())
    }

    fn insert_with<T>(
        &self,
        event_type: EventType,
        events: Vec<T>,
        select: impl FnOnce(&mut EventsByType) -> &mut Vec<T>,
    ) -> Result<(), StorageError> {
        if events.is_empty() {
            return Ok(());
        }
        self.check(event_type)?;
        let mut stored = self.events.lock().unwrap_or_else(|e| e.into_inner());
        select(&mut stored).extend(events);
        Ok(())
    }
}

impl EventStore for MemoryStore {
    fn insert_perf_samples(&self, events: Vec<PerfSample>) -> Result<(), StorageError> {
        self.insert_with(EventType::PerfSample, events, |s| &mut s.perf_samples)
    }

    fn insert_janks(&self, events: Vec<Jank>) -> Result<(), StorageError> {
        self.insert_with(EventType::Jank, events, |s| &mut s.janks)
    }

    fn insert_startups(&self, events: Vec<Startup>) -> Result<(), StorageError> {
        self.insert_with(EventType::Startup, events, |s| &mut s.startups)
    }

    fn insert_scene_loads(&self, events: Vec<SceneLoad>) -> Result<(), StorageError> {
        self.insert_with(EventType::SceneLoad, events, |s| &mut s.scene_loads)
    }

    fn insert_exceptions(&self, events: Vec<Exception>) -> Result<(), StorageError> {
        self.insert_with(EventType::Exception, events, |s| &mut s.exceptions)
    }

    fn insert_crashes(&self, events: Vec<Crash>) -> Result<(), StorageError> {
        self.insert_with(EventType::Crash, events, |s| &mut s.crashes)
    }
}

/// Store that only logs what it would have written
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStore;

impl LogStore {
    fn log_insert(event_type: EventType, count: usize) -> Result<(), StorageError> {
        if count > 0 {
            info!("Stored {} {} events", count, event_type);
        }
        Ok(())
    }
}

impl EventStore for LogStore {
    fn insert_perf_samples(&self, events: Vec<PerfSample>) -> Result<(), StorageError> {
        Self::log_insert(EventType::PerfSample, events.len())
    }

    fn insert_janks(&self, events: Vec<Jank>) -> Result<(), StorageError> {
        Self::log_insert(EventType::Jank, events.len())
    }

    fn insert_startups(&self, events: Vec<Startup>) -> Result<(), StorageError> {
        Self::log_insert(EventType::Startup, events.len())
    }

    fn insert_scene_loads(&self, events: Vec<SceneLoad>) -> Result<(), StorageError> {
        Self::log_insert(EventType::SceneLoad, events.len())
    }

    fn insert_exceptions(&self, events: Vec<Exception>) -> Result<(), StorageError> {
        Self::log_insert(EventType::Exception, events.len())
    }

    fn insert_crashes(&self, events: Vec<Crash>) -> Result<(), StorageError> {
        Self::log_insert(EventType::Crash, events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_by_type_partitions() {
        let mut events = EventsByType::default();
        assert!(events.is_empty());

        events.push(TypedEvent::Crash(Crash::default()));
        events.push(TypedEvent::Crash(Crash::default()));
        events.push(TypedEvent::Startup(Startup::default()));

        assert_eq!(events.count(EventType::Crash), 2);
        assert_eq!(events.count(EventType::Startup), 1);
        assert_eq!(events.count(EventType::Jank), 0);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_memory_store_keeps_inserts() {
        let store = MemoryStore::new();
        store
            .insert_janks(vec![Jank::default(), Jank::default()])
            .unwrap();
        store.insert_crashes(vec![Crash::default()]).unwrap();

        let stored = store.stored();
        assert_eq!(stored.janks.len(), 2);
        assert_eq!(stored.crashes.len(), 1);
        assert_eq!(stored.len(), 3);
    }

    #[test]
    fn test_memory_store_failing_table() {
        let store = MemoryStore::new();
        store.fail_on(EventType::Exception);

        assert!(store.insert_exceptions(vec![Exception::default()]).is_err());
        // Empty inserts succeed even on a failing table
        assert!(store.insert_exceptions(Vec::new()).is_ok());
        assert!(store.insert_crashes(vec![Crash::default()]).is_ok());
        assert_eq!(store.stored().exceptions.len(), 0);
    }

    #[test]
    fn test_log_store_accepts_everything() {
        let store = LogStore;
        assert!(store.insert_perf_samples(vec![PerfSample::default()]).is_ok());
        assert!(store.insert_scene_loads(Vec::new()).is_ok());
    }
}
