//! PostgreSQL-backed event feed for the service-area map.

pub mod pg_event_repository;
pub mod schema;
