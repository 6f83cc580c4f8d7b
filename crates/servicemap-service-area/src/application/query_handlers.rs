//! Query handlers for the Service Area context.
//!
//! This module contains query handlers that fetch events from the feed,
//! replay them and return read-only view DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use servicemap_core::clock::Clock;
use servicemap_core::error::DomainError;
use servicemap_core::event::order_events;
use servicemap_core::repository::EventRepository;

use crate::domain::aggregates::{AggregateState, ServiceAttributes};
use crate::domain::events::ServiceAreaEvent;
use crate::domain::projector::Projector;

/// Read-only view of a single service area at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAreaStateView {
    /// The aggregate identifier.
    pub aggregate_id: String,
    /// Whether the service area is operating.
    pub is_active: bool,
    /// Date of the creation this state descends from.
    pub effective_date: DateTime<Utc>,
    /// Date of the last applied change.
    pub last_updated: DateTime<Utc>,
    /// Date the service ended, if it has.
    pub end_date: Option<DateTime<Utc>>,
    /// Current attribute values.
    #[serde(flatten)]
    pub attributes: ServiceAttributes,
}

impl From<AggregateState> for ServiceAreaStateView {
    fn from(state: AggregateState) -> Self {
        Self {
            aggregate_id: state.aggregate_id,
            is_active: state.is_active,
            effective_date: state.effective_date,
            last_updated: state.last_updated,
            end_date: state.end_date,
            attributes: state.attributes,
        }
    }
}

/// Read-only view of a service area in collection results. The internal
/// activity flag does not cross this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAreaView {
    /// The aggregate identifier.
    pub aggregate_id: String,
    /// Date of the creation this state descends from.
    pub effective_date: DateTime<Utc>,
    /// Date of the last applied change.
    pub last_updated: DateTime<Utc>,
    /// Attribute values.
    #[serde(flatten)]
    pub attributes: ServiceAttributes,
}

impl From<AggregateState> for ServiceAreaView {
    fn from(state: AggregateState) -> Self {
        Self {
            aggregate_id: state.aggregate_id,
            effective_date: state.effective_date,
            last_updated: state.last_updated,
            attributes: state.attributes,
        }
    }
}

/// Fetches, decodes and orders events. Events past `cutoff` are dropped
/// even if the feed returned them.
async fn load_replay(
    repo: &dyn EventRepository,
    aggregate_type: &str,
    aggregate_id: Option<&str>,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<ServiceAreaEvent>, DomainError> {
    let stored_events = match aggregate_id {
        Some(id) => repo.load_aggregate_events(aggregate_type, id, cutoff).await?,
        None => repo.load_events(aggregate_type, cutoff).await?,
    };
    let mut events: Vec<ServiceAreaEvent> = stored_events
        .into_iter()
        .filter(|e| cutoff.is_none_or(|c| e.metadata.event_date <= c))
        .map(ServiceAreaEvent::decode)
        .collect();
    order_events(&mut events);
    Ok(events)
}

/// Retrieves the state of one service area as of `cutoff`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the aggregate has no state or
/// is inactive at `cutoff`.
/// Returns `DomainError::Infrastructure` if the event fetch fails.
#[tracing::instrument(skip(projector, repo))]
pub async fn state_at(
    aggregate_type: &str,
    aggregate_id: &str,
    cutoff: DateTime<Utc>,
    projector: &Projector,
    repo: &dyn EventRepository,
) -> Result<ServiceAreaStateView, DomainError> {
    let events = load_replay(repo, aggregate_type, Some(aggregate_id), Some(cutoff)).await?;
    let mut states = projector.project(&events);
    tracing::debug!(events = events.len(), "replayed aggregate");

    states
        .remove(aggregate_id)
        .filter(|state| state.is_active)
        .map(ServiceAreaStateView::from)
        .ok_or_else(|| DomainError::AggregateNotFound(aggregate_id.to_owned()))
}

/// Retrieves every service area active at `cutoff`, ordered by id.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the event fetch fails.
#[tracing::instrument(skip(projector, repo))]
pub async fn all_states_at(
    aggregate_type: &str,
    cutoff: DateTime<Utc>,
    projector: &Projector,
    repo: &dyn EventRepository,
) -> Result<Vec<ServiceAreaView>, DomainError> {
    let events = load_replay(repo, aggregate_type, None, Some(cutoff)).await?;
    let views: Vec<ServiceAreaView> = projector
        .project(&events)
        .into_values()
        .filter(|state| state.is_active)
        .map(ServiceAreaView::from)
        .collect();
    tracing::debug!(events = events.len(), active = views.len(), "replayed feed");
    Ok(views)
}

/// Retrieves every service area active now, as told by `clock`.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the event fetch fails.
pub async fn current_states(
    aggregate_type: &str,
    clock: &dyn Clock,
    projector: &Projector,
    repo: &dyn EventRepository,
) -> Result<Vec<ServiceAreaView>, DomainError> {
    all_states_at(aggregate_type, clock.now(), projector, repo).await
}

/// Retrieves every distinct state any service area has ever had, in the
/// order the states first appeared.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the event fetch fails.
#[tracing::instrument(skip(projector, repo))]
pub async fn all_historical_states(
    aggregate_type: &str,
    projector: &Projector,
    repo: &dyn EventRepository,
) -> Result<Vec<ServiceAreaView>, DomainError> {
    let events = load_replay(repo, aggregate_type, None, None).await?;
    let views: Vec<ServiceAreaView> = projector
        .collect_history(&events)
        .into_iter()
        .map(ServiceAreaView::from)
        .collect();
    tracing::debug!(events = events.len(), states = views.len(), "collected history");
    Ok(views)
}
