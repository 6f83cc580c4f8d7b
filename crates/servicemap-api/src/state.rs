//! Shared application state.

use std::sync::Arc;

use servicemap_core::clock::Clock;
use servicemap_core::repository::EventRepository;
use servicemap_service_area::application::cache::SnapshotCache;
use servicemap_service_area::domain::projector::Projector;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Source of "now" for current-state queries.
    pub clock: Arc<dyn Clock>,
    /// The ordered event feed.
    pub event_repository: Arc<dyn EventRepository>,
    /// Fold configuration used by every query.
    pub projector: Projector,
    /// Snapshot cache for collection queries, if enabled.
    pub cache: Option<Arc<SnapshotCache>>,
}

impl AppState {
    /// Create new application state without a snapshot cache.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        event_repository: Arc<dyn EventRepository>,
        projector: Projector,
    ) -> Self {
        Self {
            clock,
            event_repository,
            projector,
            cache: None,
        }
    }

    /// Attach a snapshot cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The cache as a borrowed option, the shape the cached handlers take.
    #[must_use]
    pub fn cache(&self) -> Option<&SnapshotCache> {
        self.cache.as_deref()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("projector", &self.projector)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
