//! Domain layer: event registry, state machine and projector.

pub mod aggregates;
pub mod events;
pub mod projector;
