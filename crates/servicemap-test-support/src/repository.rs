//! Test repositories — mock `EventRepository` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use servicemap_core::error::DomainError;
use servicemap_core::repository::{EventRepository, NewEvent, StoredEvent};

/// An in-memory event repository that records every load call.
///
/// Loads filter by aggregate type, aggregate id and cutoff but keep the
/// physical order the events were given in, so callers that need replay
/// order must sort themselves.
#[derive(Debug, Default)]
pub struct RecordingEventRepository {
    events: Mutex<Vec<StoredEvent>>,
    loads: Mutex<Vec<(String, Option<String>, Option<DateTime<Utc>>)>>,
}

impl RecordingEventRepository {
    /// Create a new recording repository holding `events` in the given order.
    #[must_use]
    pub fn new(events: Vec<StoredEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            loads: Mutex::new(Vec::new()),
        }
    }

    /// Returns every `(aggregate_type, aggregate_id, cutoff)` load seen so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn loads(&self) -> Vec<(String, Option<String>, Option<DateTime<Utc>>)> {
        self.loads.lock().unwrap().clone()
    }

    /// Returns the number of load calls seen so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn load_count(&self) -> usize {
        self.loads.lock().unwrap().len()
    }

    fn filtered(
        &self,
        aggregate_type: &str,
        aggregate_id: Option<&str>,
        cutoff: Option<DateTime<Utc>>,
    ) -> Vec<StoredEvent> {
        self.loads.lock().unwrap().push((
            aggregate_type.to_owned(),
            aggregate_id.map(str::to_owned),
            cutoff,
        ));
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.metadata.aggregate_type == aggregate_type)
            .filter(|e| aggregate_id.is_none_or(|id| e.metadata.aggregate_id == id))
            .filter(|e| cutoff.is_none_or(|c| e.metadata.event_date <= c))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(
        &self,
        aggregate_type: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.filtered(aggregate_type, None, cutoff))
    }

    async fn load_aggregate_events(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.filtered(aggregate_type, Some(aggregate_id), cutoff))
    }

    async fn append_event(&self, event: NewEvent) -> Result<StoredEvent, DomainError> {
        let mut events = self.events.lock().unwrap();
        let next_seq = events
            .iter()
            .map(|e| e.metadata.insertion_seq)
            .max()
            .unwrap_or(0)
            + 1;
        let stored = event.into_stored(next_seq);
        events.push(stored.clone());
        Ok(stored)
    }
}

/// An event repository that always returns an empty event list and silently
/// accepts appends. Useful for testing "aggregate not found" scenarios.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(
        &self,
        _aggregate_type: &str,
        _cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn load_aggregate_events(
        &self,
        _aggregate_type: &str,
        _aggregate_id: &str,
        _cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_event(&self, event: NewEvent) -> Result<StoredEvent, DomainError> {
        Ok(event.into_stored(1))
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(
        &self,
        _aggregate_type: &str,
        _cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn load_aggregate_events(
        &self,
        _aggregate_type: &str,
        _aggregate_id: &str,
        _cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_event(&self, _event: NewEvent) -> Result<StoredEvent, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
