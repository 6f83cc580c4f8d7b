//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use servicemap_core::clock::Clock;
use servicemap_core::repository::{EventRepository, StoredEvent};
use servicemap_service_area::application::cache::SnapshotCache;
use servicemap_service_area::domain::projector::Projector;
use servicemap_test_support::{FixedClock, RecordingEventRepository};
use tower::ServiceExt;

use servicemap_api::state::AppState;

/// "Now" for every integration test.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(now()))
}

/// Build the full app router over `repo` with a fixed clock and default
/// projector. Uses the same route structure as `main.rs`.
pub fn build_test_app(repo: Arc<dyn EventRepository>) -> Router {
    servicemap_api::build_router(AppState::new(fixed_clock(), repo, Projector::default()))
}

/// Same as [`build_test_app`] with a snapshot cache attached.
pub fn build_cached_test_app(repo: Arc<dyn EventRepository>, cache: Arc<SnapshotCache>) -> Router {
    servicemap_api::build_router(
        AppState::new(fixed_clock(), repo, Projector::default()).with_cache(cache),
    )
}

/// In-memory app over the given events. Returns the repository too so tests
/// can inspect the loads it saw.
pub fn in_memory_app(events: Vec<StoredEvent>) -> (Router, Arc<RecordingEventRepository>) {
    let repo = Arc::new(RecordingEventRepository::new(events));
    (build_test_app(repo.clone()), repo)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
