//! Event feed abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::{DomainEvent, EventMetadata};

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Envelope fields shared by every event.
    pub metadata: EventMetadata,
    /// Event type name as written by the producer.
    pub event_type: String,
    /// Kind-specific payload. `Value::Null` when the producer sent none.
    pub payload: serde_json::Value,
}

impl DomainEvent for StoredEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// An event as handed to the store for appending. The store assigns the
/// insertion sequence.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Namespace of the aggregate.
    pub aggregate_type: String,
    /// Aggregate this event belongs to.
    pub aggregate_id: String,
    /// Event type name.
    pub event_type: String,
    /// Logical time the event took effect.
    pub event_date: DateTime<Utc>,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
    /// Optional provenance.
    pub source: Option<String>,
}

impl NewEvent {
    /// Builds the stored form once the store has assigned `insertion_seq`.
    #[must_use]
    pub fn into_stored(self, insertion_seq: i64) -> StoredEvent {
        StoredEvent {
            metadata: EventMetadata {
                event_id: self.event_id,
                aggregate_type: self.aggregate_type,
                aggregate_id: self.aggregate_id,
                event_date: self.event_date,
                insertion_seq,
                source: self.source,
            },
            event_type: self.event_type,
            payload: self.payload,
        }
    }
}

/// Repository trait for reading the ordered event feed and appending to it.
///
/// Reads return events of the requested aggregate type whose `event_date` is
/// at or before `cutoff` (all events when `cutoff` is `None`), ascending by
/// `(event_date, insertion_seq)`.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load every event of an aggregate type up to an optional cutoff.
    async fn load_events(
        &self,
        aggregate_type: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Load the events of a single aggregate up to an optional cutoff.
    async fn load_aggregate_events(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Append one event, returning it with its assigned insertion sequence.
    async fn append_event(&self, event: NewEvent) -> Result<StoredEvent, DomainError>;
}
