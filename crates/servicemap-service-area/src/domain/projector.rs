//! Folding ordered event slices into per-aggregate state.
//!
//! Every call owns its working map: it is built, read and dropped inside the
//! call, so concurrent projections never share state.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::aggregates::{AggregateState, ServiceAreaStateMachine, ServiceAttributes};
use super::events::ServiceAreaEvent;

/// Current state per aggregate id, ordered by id.
pub type ProjectedStates = BTreeMap<String, AggregateState>;

/// The attribute that tells two historical states of an aggregate apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryKey {
    /// Any change to the attribute bag yields a new historical state.
    #[default]
    Attributes,
    /// Only a new geometry reference yields a new historical state.
    GeometryReference,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum Distinguishing {
    Attributes(ServiceAttributes),
    Geometry(Option<String>),
}

impl HistoryKey {
    fn distinguishing_value(self, state: &AggregateState) -> Distinguishing {
        match self {
            Self::Attributes => Distinguishing::Attributes(state.attributes.clone()),
            Self::GeometryReference => {
                Distinguishing::Geometry(state.attributes.geometry_reference.clone())
            }
        }
    }
}

/// Folds events through the state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Projector {
    state_machine: ServiceAreaStateMachine,
    history_key: HistoryKey,
}

impl Projector {
    /// Creates a projector.
    #[must_use]
    pub const fn new(state_machine: ServiceAreaStateMachine, history_key: HistoryKey) -> Self {
        Self {
            state_machine,
            history_key,
        }
    }

    /// Returns the state machine used for each transition.
    #[must_use]
    pub const fn state_machine(&self) -> ServiceAreaStateMachine {
        self.state_machine
    }

    /// Returns the configured history key.
    #[must_use]
    pub const fn history_key(&self) -> HistoryKey {
        self.history_key
    }

    /// Folds `events`, which must already be in replay order, into the state
    /// of every aggregate they mention. Aggregates may be interleaved.
    #[must_use]
    pub fn project<'a, I>(&self, events: I) -> ProjectedStates
    where
        I: IntoIterator<Item = &'a ServiceAreaEvent>,
    {
        let mut states = ProjectedStates::new();
        for event in events {
            self.step(&mut states, event);
        }
        states
    }

    /// Folds `events` and returns every distinct active state ever observed,
    /// in the order each was first seen. A state is distinct when its
    /// `(aggregate_id, history key value)` pair has not been recorded yet.
    #[must_use]
    pub fn collect_history<'a, I>(&self, events: I) -> Vec<AggregateState>
    where
        I: IntoIterator<Item = &'a ServiceAreaEvent>,
    {
        let mut states: HashMap<String, AggregateState> = HashMap::new();
        let mut recorded: HashSet<(String, Distinguishing)> = HashSet::new();
        let mut timeline = Vec::new();

        for event in events {
            let Some(state) = self.step(&mut states, event) else {
                continue;
            };
            if !state.is_active {
                continue;
            }
            let key = (
                state.aggregate_id.clone(),
                self.history_key.distinguishing_value(state),
            );
            if recorded.insert(key) {
                timeline.push(state.clone());
            }
        }
        timeline
    }

    fn step<'m, M>(&self, states: &'m mut M, event: &ServiceAreaEvent) -> Option<&'m AggregateState>
    where
        M: StateMap,
    {
        let aggregate_id = &event.metadata.aggregate_id;
        let prior = states.take(aggregate_id);
        let next = self.state_machine.apply(prior, event)?;
        Some(states.put(aggregate_id.clone(), next))
    }
}

/// The working map a fold writes to.
trait StateMap {
    fn take(&mut self, aggregate_id: &str) -> Option<AggregateState>;
    fn put(&mut self, aggregate_id: String, state: AggregateState) -> &AggregateState;
}

impl StateMap for BTreeMap<String, AggregateState> {
    fn take(&mut self, aggregate_id: &str) -> Option<AggregateState> {
        self.remove(aggregate_id)
    }

    fn put(&mut self, aggregate_id: String, state: AggregateState) -> &AggregateState {
        self.entry(aggregate_id).or_insert(state)
    }
}

impl StateMap for HashMap<String, AggregateState> {
    fn take(&mut self, aggregate_id: &str) -> Option<AggregateState> {
        self.remove(aggregate_id)
    }

    fn put(&mut self, aggregate_id: String, state: AggregateState) -> &AggregateState {
        self.entry(aggregate_id).or_insert(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use servicemap_core::event::order_events;
    use servicemap_test_support::{at, stored_event};

    use crate::domain::aggregates::CreationPolicy;
    use crate::domain::events::{
        ACCESS_POLICY_CHANGED_EVENT_TYPE, FARES_POLICY_CHANGED_EVENT_TYPE,
        GEOMETRY_UPDATED_EVENT_TYPE, SERVICE_CREATED_EVENT_TYPE, SERVICE_ENDED_EVENT_TYPE,
        SERVICE_UPDATED_EVENT_TYPE, ServiceAreaEventKind, VEHICLE_TYPES_UPDATED_EVENT_TYPE,
    };

    fn event(
        aggregate_id: &str,
        event_type: &str,
        day: u32,
        seq: i64,
        payload: Value,
    ) -> ServiceAreaEvent {
        ServiceAreaEvent::decode(stored_event(
            aggregate_id,
            event_type,
            at(2025, 2, day),
            seq,
            payload,
        ))
    }

    #[test]
    fn test_project_empty_slice_yields_empty_map() {
        let events: Vec<ServiceAreaEvent> = Vec::new();

        let states = Projector::default().project(&events);

        assert!(states.is_empty());
    }

    #[test]
    fn test_project_handles_interleaved_aggregates() {
        // Arrange
        let events = vec![
            event("a", SERVICE_CREATED_EVENT_TYPE, 1, 1, json!({"company": "Waymo"})),
            event("b", SERVICE_CREATED_EVENT_TYPE, 1, 2, json!({"company": "Zoox"})),
            event("a", FARES_POLICY_CHANGED_EVENT_TYPE, 2, 3, json!({"newFares": "free"})),
            event("b", SERVICE_ENDED_EVENT_TYPE, 3, 4, Value::Null),
            event("c", SERVICE_ENDED_EVENT_TYPE, 3, 5, Value::Null),
        ];

        // Act
        let states = Projector::default().project(&events);

        // Assert
        assert_eq!(states.len(), 2);
        let a = &states["a"];
        assert!(a.is_active);
        assert_eq!(a.attributes.fares.as_deref(), Some("free"));
        assert_eq!(a.last_updated, at(2025, 2, 2));
        let b = &states["b"];
        assert!(!b.is_active);
        assert_eq!(b.end_date, Some(at(2025, 2, 3)));
        assert!(!states.contains_key("c"));
    }

    #[test]
    fn test_project_matches_per_aggregate_projection() {
        // Arrange
        let events = vec![
            event("a", SERVICE_CREATED_EVENT_TYPE, 1, 1, json!({"fares": "paid"})),
            event("b", SERVICE_CREATED_EVENT_TYPE, 2, 2, json!({"fares": "free"})),
            event("a", SERVICE_UPDATED_EVENT_TYPE, 3, 3, json!({"city": "Austin"})),
            event("b", GEOMETRY_UPDATED_EVENT_TYPE, 4, 4, json!({"newGeometryName": "b2"})),
        ];
        let projector = Projector::default();

        // Act
        let together = projector.project(&events);
        let only_a = projector.project(events.iter().filter(|e| e.metadata.aggregate_id == "a"));
        let only_b = projector.project(events.iter().filter(|e| e.metadata.aggregate_id == "b"));

        // Assert
        assert_eq!(together["a"], only_a["a"]);
        assert_eq!(together["b"], only_b["b"]);
    }

    #[test]
    fn test_reactivation_keeps_only_second_creation() {
        let events = vec![
            event(
                "a",
                SERVICE_CREATED_EVENT_TYPE,
                1,
                1,
                json!({"company": "Cruise", "fares": "paid"}),
            ),
            event("a", SERVICE_ENDED_EVENT_TYPE, 2, 2, Value::Null),
            event("a", SERVICE_CREATED_EVENT_TYPE, 9, 3, json!({"company": "Cruise"})),
        ];

        let states = Projector::default().project(&events);

        let a = &states["a"];
        assert!(a.is_active);
        assert_eq!(a.effective_date, at(2025, 2, 9));
        assert_eq!(a.attributes.fares, None);
        assert_eq!(a.end_date, None);
    }

    #[test]
    fn test_collect_history_records_each_distinct_state_once() {
        // Arrange
        let events = vec![
            event("a", SERVICE_CREATED_EVENT_TYPE, 1, 1, json!({"fares": "paid"})),
            event("a", FARES_POLICY_CHANGED_EVENT_TYPE, 2, 2, json!({"newFares": "free"})),
            event("a", FARES_POLICY_CHANGED_EVENT_TYPE, 3, 3, json!({"newFares": "paid"})),
            event("a", SERVICE_ENDED_EVENT_TYPE, 4, 4, Value::Null),
        ];

        // Act
        let history = Projector::default().collect_history(&events);

        // Assert
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].attributes.fares.as_deref(), Some("paid"));
        assert_eq!(history[0].last_updated, at(2025, 2, 1));
        assert_eq!(history[1].attributes.fares.as_deref(), Some("free"));
        assert_eq!(history[1].last_updated, at(2025, 2, 2));
        assert!(history.iter().all(|s| s.is_active));
    }

    #[test]
    fn test_collect_history_by_geometry_ignores_other_attribute_changes() {
        // Arrange
        let projector = Projector::new(
            ServiceAreaStateMachine::default(),
            HistoryKey::GeometryReference,
        );
        let events = vec![
            event("a", SERVICE_CREATED_EVENT_TYPE, 1, 1, json!({"geometryName": "g1"})),
            event("a", FARES_POLICY_CHANGED_EVENT_TYPE, 2, 2, json!({"newFares": "free"})),
            event("a", GEOMETRY_UPDATED_EVENT_TYPE, 3, 3, json!({"newGeometryName": "g2"})),
            event("a", GEOMETRY_UPDATED_EVENT_TYPE, 4, 4, json!({"newGeometryName": "g1"})),
            event("b", SERVICE_CREATED_EVENT_TYPE, 5, 5, json!({"geometryName": "g1"})),
        ];

        // Act
        let history = projector.collect_history(&events);

        // Assert
        let keys: Vec<(&str, Option<&str>)> = history
            .iter()
            .map(|s| {
                (
                    s.aggregate_id.as_str(),
                    s.attributes.geometry_reference.as_deref(),
                )
            })
            .collect();
        assert_eq!(
            keys,
            vec![("a", Some("g1")), ("a", Some("g2")), ("b", Some("g1"))]
        );
        assert_eq!(history[0].attributes.fares, None);
    }

    #[test]
    fn test_collect_history_keeps_snapshot_overwritten_by_duplicate_creation() {
        let events = vec![
            event("a", SERVICE_CREATED_EVENT_TYPE, 1, 1, json!({"company": "Waymo"})),
            event("a", SERVICE_CREATED_EVENT_TYPE, 2, 2, json!({"company": "Zoox"})),
        ];

        let projector = Projector::new(
            ServiceAreaStateMachine::new(CreationPolicy::Overwrite),
            HistoryKey::Attributes,
        );
        let history = projector.collect_history(&events);
        let current = projector.project(&events);

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].attributes.company.as_deref(), Some("Waymo"));
        assert_eq!(current["a"].attributes.company.as_deref(), Some("Zoox"));
    }

    const KINDS: [&str; 8] = [
        SERVICE_CREATED_EVENT_TYPE,
        SERVICE_ENDED_EVENT_TYPE,
        SERVICE_UPDATED_EVENT_TYPE,
        FARES_POLICY_CHANGED_EVENT_TYPE,
        ACCESS_POLICY_CHANGED_EVENT_TYPE,
        GEOMETRY_UPDATED_EVENT_TYPE,
        VEHICLE_TYPES_UPDATED_EVENT_TYPE,
        "service_paused",
    ];

    fn arbitrary_events() -> impl Strategy<Value = Vec<ServiceAreaEvent>> {
        prop::collection::vec((0..3usize, 0..KINDS.len(), 0..4i64, 0..3usize), 0..40).prop_map(
            |specs| {
                let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
                specs
                    .into_iter()
                    .enumerate()
                    .map(|(seq, (aggregate, kind, offset_days, value))| {
                        let value = ["paid", "free", "beta"][value];
                        let payload = json!({
                            "fares": value,
                            "newFares": value,
                            "newAccess": value,
                            "newGeometryName": value,
                            "newVehicleTypes": [value],
                        });
                        ServiceAreaEvent::decode(stored_event(
                            ["a", "b", "c"][aggregate],
                            KINDS[kind],
                            base + Duration::days(offset_days),
                            i64::try_from(seq).unwrap(),
                            payload,
                        ))
                    })
                    .collect()
            },
        )
    }

    proptest! {
        /// Property: the fold depends only on replay order, not fetch order.
        #[test]
        fn prop_projection_ignores_fetch_order(
            (events, shuffled) in arbitrary_events()
                .prop_flat_map(|events| (Just(events.clone()), Just(events).prop_shuffle()))
        ) {
            let projector = Projector::default();
            let mut ordered = events;
            let mut reordered = shuffled;
            order_events(&mut ordered);
            order_events(&mut reordered);

            prop_assert_eq!(projector.project(&ordered), projector.project(&reordered));
            prop_assert_eq!(
                projector.collect_history(&ordered),
                projector.collect_history(&reordered)
            );
        }

        /// Property: replaying the same sequence twice gives identical state.
        #[test]
        fn prop_replay_is_idempotent(mut events in arbitrary_events()) {
            order_events(&mut events);
            let projector = Projector::default();

            prop_assert_eq!(projector.project(&events), projector.project(&events));
        }

        /// Property: only aggregates with a `service_created` ever get state.
        #[test]
        fn prop_state_requires_creation(mut events in arbitrary_events()) {
            order_events(&mut events);

            let states = Projector::default().project(&events);

            for aggregate_id in states.keys() {
                let created = events.iter().any(|e| {
                    &e.metadata.aggregate_id == aggregate_id
                        && e.metadata.event_date <= states[aggregate_id].effective_date
                        && matches!(e.kind, ServiceAreaEventKind::ServiceCreated(_))
                });
                prop_assert!(created, "aggregate {} has state without a creation", aggregate_id);
            }
        }
    }
}
