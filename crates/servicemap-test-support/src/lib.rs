//! Shared test mocks and utilities for the service-area map.

mod clock;
mod events;
mod repository;

pub use clock::FixedClock;
pub use events::{at, stored_event};
pub use repository::{EmptyEventRepository, FailingEventRepository, RecordingEventRepository};
