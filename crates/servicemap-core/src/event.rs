//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Namespace of the aggregate, e.g. `service_area`.
    pub aggregate_type: String,
    /// Aggregate this event belongs to.
    pub aggregate_id: String,
    /// Logical/business time the event took effect.
    pub event_date: DateTime<Utc>,
    /// Store-assigned append sequence; tie-break for equal `event_date`.
    pub insertion_seq: i64,
    /// Optional provenance. Never consulted by transitions.
    pub source: Option<String>,
}

/// Position of an event in the replay order: `(event_date, insertion_seq)`.
pub type ReplayPosition = (DateTime<Utc>, i64);

/// Trait that all domain events implement.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the event type name as written by the producer.
    fn event_type(&self) -> &str;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Returns the key events of one aggregate are totally ordered by.
    fn replay_position(&self) -> ReplayPosition {
        let meta = self.metadata();
        (meta.event_date, meta.insertion_seq)
    }
}

/// Stably sorts events into replay order.
///
/// Fetch order is never trusted: callers sort before folding so the result
/// only depends on `(event_date, insertion_seq)`.
pub fn order_events<E: DomainEvent>(events: &mut [E]) {
    events.sort_by_key(DomainEvent::replay_position);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug)]
    struct TestEvent(EventMetadata);

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &str {
            "test"
        }

        fn metadata(&self) -> &EventMetadata {
            &self.0
        }
    }

    fn event_at(day: u32, insertion_seq: i64) -> TestEvent {
        TestEvent(EventMetadata {
            event_id: Uuid::new_v4(),
            aggregate_type: "service_area".to_owned(),
            aggregate_id: "a".to_owned(),
            event_date: Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap(),
            insertion_seq,
            source: None,
        })
    }

    #[test]
    fn test_order_events_sorts_by_date_then_insertion_seq() {
        // Arrange
        let mut events = vec![event_at(3, 1), event_at(1, 5), event_at(1, 2), event_at(2, 9)];

        // Act
        order_events(&mut events);

        // Assert
        let positions: Vec<(u32, i64)> = events
            .iter()
            .map(|e| {
                (
                    chrono::Datelike::day(&e.metadata().event_date),
                    e.metadata().insertion_seq,
                )
            })
            .collect();
        assert_eq!(positions, vec![(1, 2), (1, 5), (2, 9), (3, 1)]);
    }
}
