//! Service-area map HTTP API.
//!
//! Serves point-in-time snapshots of service areas as JSON. The binary in
//! `main.rs` wires configuration, the PostgreSQL event store and the router.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/service-areas", routes::service_areas::router())
        .with_state(state)
}
