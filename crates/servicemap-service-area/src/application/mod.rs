//! Application layer: snapshot queries and their optional cache.

pub mod cache;
pub mod query_handlers;
