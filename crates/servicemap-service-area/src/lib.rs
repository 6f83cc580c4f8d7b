//! Service-area map — Service Area bounded context.
//!
//! Reconstructs service-area attributes at any point in time by replaying
//! the append-only event log.

pub mod application;
pub mod domain;
