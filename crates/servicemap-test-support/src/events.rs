//! Builders for stored events used across test suites.

use chrono::{DateTime, TimeZone, Utc};
use servicemap_core::event::EventMetadata;
use servicemap_core::repository::StoredEvent;
use uuid::Uuid;

/// Midnight UTC on the given calendar day.
///
/// # Panics
///
/// Panics if the date does not exist.
#[must_use]
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Builds a `service_area` event with the given envelope and payload.
#[must_use]
pub fn stored_event(
    aggregate_id: &str,
    event_type: &str,
    event_date: DateTime<Utc>,
    insertion_seq: i64,
    payload: serde_json::Value,
) -> StoredEvent {
    StoredEvent {
        metadata: EventMetadata {
            event_id: Uuid::new_v4(),
            aggregate_type: "service_area".to_owned(),
            aggregate_id: aggregate_id.to_owned(),
            event_date,
            insertion_seq,
            source: None,
        },
        event_type: event_type.to_owned(),
        payload,
    }
}
