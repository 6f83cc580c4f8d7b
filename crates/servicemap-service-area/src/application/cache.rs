//! Snapshot cache for collection queries.
//!
//! Results for a cutoff in the past never change once computed, so those
//! entries do not expire. Their number is capped and the oldest insertion is
//! evicted first. "Now" and full-history results expire after a TTL or on
//! [`SnapshotCache::invalidate_current`]. Cutoffs in the future are never
//! cached because events may still be appended before them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use servicemap_core::clock::Clock;
use servicemap_core::error::DomainError;
use servicemap_core::repository::{EventRepository, NewEvent, StoredEvent};

use super::query_handlers::{self, ServiceAreaView};
use crate::domain::projector::Projector;

/// Default cap on cached past-cutoff snapshots.
pub const DEFAULT_MAX_PAST_ENTRIES: usize = 256;

/// Identifies one cached collection result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SnapshotKey {
    /// `all_states_at` for a cutoff at or before the time of caching.
    StatesAt {
        /// Aggregate type namespace.
        aggregate_type: String,
        /// The cutoff.
        cutoff: DateTime<Utc>,
    },
    /// `current_states`.
    Current {
        /// Aggregate type namespace.
        aggregate_type: String,
    },
    /// `all_historical_states`.
    History {
        /// Aggregate type namespace.
        aggregate_type: String,
    },
}

impl SnapshotKey {
    fn is_immutable(&self) -> bool {
        matches!(self, Self::StatesAt { .. })
    }
}

#[derive(Debug)]
struct CacheEntry {
    views: Arc<Vec<ServiceAreaView>>,
    expires_at: Option<DateTime<Utc>>,
    stamp: u64,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// Concurrent cache of computed collection snapshots.
#[derive(Debug)]
pub struct SnapshotCache {
    entries: DashMap<SnapshotKey, CacheEntry>,
    current_ttl: Duration,
    max_past_entries: usize,
    next_stamp: AtomicU64,
}

impl SnapshotCache {
    /// Creates an empty cache whose "now" entries live for `current_ttl`,
    /// holding at most [`DEFAULT_MAX_PAST_ENTRIES`] past-cutoff snapshots.
    #[must_use]
    pub fn new(current_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            current_ttl,
            max_past_entries: DEFAULT_MAX_PAST_ENTRIES,
            next_stamp: AtomicU64::new(0),
        }
    }

    /// Caps the number of past-cutoff snapshots. The cap is at least one.
    #[must_use]
    pub fn with_max_past_entries(mut self, max_past_entries: usize) -> Self {
        self.max_past_entries = max_past_entries.max(1);
        self
    }

    /// Number of cached entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached views for `key` if present and fresh at `now`.
    #[must_use]
    pub fn get(&self, key: &SnapshotKey, now: DateTime<Utc>) -> Option<Arc<Vec<ServiceAreaView>>> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| Arc::clone(&entry.views))
    }

    /// Stores `views` under `key` unless a fresh entry already exists, in
    /// which case the existing entry wins and is returned. A new past-cutoff
    /// entry beyond the cap evicts the oldest one.
    pub fn insert(
        &self,
        key: SnapshotKey,
        views: Vec<ServiceAreaView>,
        now: DateTime<Utc>,
    ) -> Arc<Vec<ServiceAreaView>> {
        let expires_at = (!key.is_immutable()).then(|| now + self.current_ttl);
        let entry = CacheEntry {
            views: Arc::new(views),
            expires_at,
            stamp: self.next_stamp.fetch_add(1, Ordering::Relaxed),
        };
        let (views, added_past) = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_fresh(now) {
                    return Arc::clone(&occupied.get().views);
                }
                let views = Arc::clone(&entry.views);
                occupied.insert(entry);
                (views, false)
            }
            Entry::Vacant(vacant) => {
                let added_past = vacant.key().is_immutable();
                let views = Arc::clone(&entry.views);
                vacant.insert(entry);
                (views, added_past)
            }
        };
        if added_past {
            self.evict_oldest_past();
        }
        views
    }

    /// Number of cached past-cutoff entries.
    #[must_use]
    pub fn past_len(&self) -> usize {
        self.entries.iter().filter(|e| e.key().is_immutable()).count()
    }

    // Must not be called while holding a guard into `entries`.
    fn evict_oldest_past(&self) {
        loop {
            let mut count = 0;
            let mut oldest: Option<(u64, SnapshotKey)> = None;
            for entry in self.entries.iter().filter(|e| e.key().is_immutable()) {
                count += 1;
                let stamp = entry.value().stamp;
                if oldest.as_ref().is_none_or(|(seen, _)| stamp < *seen) {
                    oldest = Some((stamp, entry.key().clone()));
                }
            }
            match oldest {
                Some((_, key)) if count > self.max_past_entries => {
                    tracing::debug!(?key, "evicting past snapshot");
                    self.entries.remove(&key);
                }
                _ => break,
            }
        }
    }

    /// Drops every "now" and history entry. Entries for past cutoffs are kept.
    ///
    /// The HTTP API never appends, so there "now" freshness relies on the TTL
    /// alone.
    pub fn invalidate_current(&self) {
        self.entries.retain(|key, _| key.is_immutable());
    }

    /// Drops every entry of `aggregate_type` that an event dated
    /// `event_date` could change: "now", history, and past cutoffs at or
    /// after `event_date`.
    pub fn invalidate_from(&self, aggregate_type: &str, event_date: DateTime<Utc>) {
        self.entries.retain(|key, _| match key {
            SnapshotKey::StatesAt {
                aggregate_type: cached_type,
                cutoff,
            } => cached_type != aggregate_type || *cutoff < event_date,
            SnapshotKey::Current {
                aggregate_type: cached_type,
            }
            | SnapshotKey::History {
                aggregate_type: cached_type,
            } => cached_type != aggregate_type,
        });
    }
}

/// Appends `event` to the feed and drops every cached snapshot it affects,
/// including past cutoffs when the event is backdated.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the append fails; the cache is
/// left untouched in that case.
pub async fn append_and_invalidate(
    event: NewEvent,
    repo: &dyn EventRepository,
    cache: Option<&SnapshotCache>,
) -> Result<StoredEvent, DomainError> {
    let stored = repo.append_event(event).await?;
    if let Some(cache) = cache {
        cache.invalidate_from(&stored.metadata.aggregate_type, stored.metadata.event_date);
    }
    tracing::info!(
        aggregate_id = %stored.metadata.aggregate_id,
        event_type = %stored.event_type,
        insertion_seq = stored.metadata.insertion_seq,
        "appended event"
    );
    Ok(stored)
}

/// [`query_handlers::all_states_at`] behind the optional cache.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the event fetch fails.
pub async fn cached_all_states_at(
    aggregate_type: &str,
    cutoff: DateTime<Utc>,
    clock: &dyn Clock,
    projector: &Projector,
    repo: &dyn EventRepository,
    cache: Option<&SnapshotCache>,
) -> Result<Arc<Vec<ServiceAreaView>>, DomainError> {
    let now = clock.now();
    let Some(cache) = cache.filter(|_| cutoff <= now) else {
        return query_handlers::all_states_at(aggregate_type, cutoff, projector, repo)
            .await
            .map(Arc::new);
    };
    let key = SnapshotKey::StatesAt {
        aggregate_type: aggregate_type.to_owned(),
        cutoff,
    };
    if let Some(hit) = cache.get(&key, now) {
        tracing::debug!(?key, "snapshot cache hit");
        return Ok(hit);
    }
    let views = query_handlers::all_states_at(aggregate_type, cutoff, projector, repo).await?;
    Ok(cache.insert(key, views, now))
}

/// [`query_handlers::current_states`] behind the optional cache.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the event fetch fails.
pub async fn cached_current_states(
    aggregate_type: &str,
    clock: &dyn Clock,
    projector: &Projector,
    repo: &dyn EventRepository,
    cache: Option<&SnapshotCache>,
) -> Result<Arc<Vec<ServiceAreaView>>, DomainError> {
    let Some(cache) = cache else {
        return query_handlers::current_states(aggregate_type, clock, projector, repo)
            .await
            .map(Arc::new);
    };
    let now = clock.now();
    let key = SnapshotKey::Current {
        aggregate_type: aggregate_type.to_owned(),
    };
    if let Some(hit) = cache.get(&key, now) {
        tracing::debug!(?key, "snapshot cache hit");
        return Ok(hit);
    }
    let views = query_handlers::all_states_at(aggregate_type, now, projector, repo).await?;
    Ok(cache.insert(key, views, now))
}

/// [`query_handlers::all_historical_states`] behind the optional cache.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the event fetch fails.
pub async fn cached_all_historical_states(
    aggregate_type: &str,
    clock: &dyn Clock,
    projector: &Projector,
    repo: &dyn EventRepository,
    cache: Option<&SnapshotCache>,
) -> Result<Arc<Vec<ServiceAreaView>>, DomainError> {
    let Some(cache) = cache else {
        return query_handlers::all_historical_states(aggregate_type, projector, repo)
            .await
            .map(Arc::new);
    };
    let now = clock.now();
    let key = SnapshotKey::History {
        aggregate_type: aggregate_type.to_owned(),
    };
    if let Some(hit) = cache.get(&key, now) {
        tracing::debug!(?key, "snapshot cache hit");
        return Ok(hit);
    }
    let views = query_handlers::all_historical_states(aggregate_type, projector, repo).await?;
    Ok(cache.insert(key, views, now))
}
