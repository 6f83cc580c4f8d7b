//! Domain error types.

use thiserror::Error;

/// Top-level domain error type.
///
/// Every variant is scoped to a single query; nothing here is fatal to the
/// process.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No active state exists for the aggregate at the requested cutoff.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),

    /// A validation error in request or domain input.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error, e.g. the event store is down.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
