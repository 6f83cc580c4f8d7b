//! Routes for the Service Area bounded context.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use servicemap_core::error::DomainError;
use servicemap_service_area::application::cache;
use servicemap_service_area::application::query_handlers::{
    self, ServiceAreaStateView, ServiceAreaView,
};
use servicemap_service_area::domain::events::SERVICE_AREA_AGGREGATE_TYPE;

use crate::error::ApiError;
use crate::state::AppState;

/// Query string accepted by the snapshot endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    /// RFC 3339 timestamp or `YYYY-MM-DD` date. Absent means now.
    pub at: Option<String>,
}

/// Parses an `at` value. A bare date is the last instant of that UTC day so
/// every event dated that day is included.
///
/// # Errors
///
/// Returns `DomainError::Validation` if `raw` is neither form.
pub fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>, DomainError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_nano_opt(23, 59, 59, 999_999_999))
        .map(|end_of_day| end_of_day.and_utc())
        .ok_or_else(|| {
            DomainError::Validation(format!(
                "`at` must be an RFC 3339 timestamp or a YYYY-MM-DD date, got `{raw}`"
            ))
        })
}

fn requested_cutoff(query: &SnapshotQuery) -> Result<Option<DateTime<Utc>>, DomainError> {
    query.at.as_deref().map(parse_cutoff).transpose()
}

/// GET /api/v1/service-areas
async fn list_service_areas(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<Arc<Vec<ServiceAreaView>>>, ApiError> {
    let views = match requested_cutoff(&query)? {
        Some(cutoff) => {
            cache::cached_all_states_at(
                SERVICE_AREA_AGGREGATE_TYPE,
                cutoff,
                state.clock.as_ref(),
                &state.projector,
                state.event_repository.as_ref(),
                state.cache(),
            )
            .await?
        }
        None => {
            cache::cached_current_states(
                SERVICE_AREA_AGGREGATE_TYPE,
                state.clock.as_ref(),
                &state.projector,
                state.event_repository.as_ref(),
                state.cache(),
            )
            .await?
        }
    };
    Ok(Json(views))
}

/// GET /api/v1/service-areas/history
async fn list_history(
    State(state): State<AppState>,
) -> Result<Json<Arc<Vec<ServiceAreaView>>>, ApiError> {
    let views = cache::cached_all_historical_states(
        SERVICE_AREA_AGGREGATE_TYPE,
        state.clock.as_ref(),
        &state.projector,
        state.event_repository.as_ref(),
        state.cache(),
    )
    .await?;
    Ok(Json(views))
}

/// GET /api/v1/service-areas/{aggregate_id}
async fn get_service_area(
    State(state): State<AppState>,
    Path(aggregate_id): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<ServiceAreaStateView>, ApiError> {
    let cutoff = requested_cutoff(&query)?.unwrap_or_else(|| state.clock.now());
    let view = query_handlers::state_at(
        SERVICE_AREA_AGGREGATE_TYPE,
        &aggregate_id,
        cutoff,
        &state.projector,
        state.event_repository.as_ref(),
    )
    .await?;
    Ok(Json(view))
}

/// Returns the router for the service area context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_service_areas))
        .route("/history", get(list_history))
        .route("/{aggregate_id}", get(get_service_area))
}
