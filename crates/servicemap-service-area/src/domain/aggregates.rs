//! Aggregate state and the transition function for the Service Area context.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::events::{ServiceAreaEvent, ServiceAreaEventKind, ServiceCreated};

/// One attribute of a service area that events may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeField {
    /// Display name of the service area.
    Name,
    /// Operating company.
    Company,
    /// City the service area belongs to.
    City,
    /// Name of the boundary geometry file.
    GeometryReference,
    /// Fares policy, e.g. `paid` or `free`.
    Fares,
    /// Rider access policy, e.g. `public` or `waitlist`.
    Access,
    /// Vehicle models in service.
    VehicleTypes,
    /// Safety driver policy, e.g. `driverless`.
    Supervision,
}

impl AttributeField {
    /// Every attribute field, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Name,
        Self::Company,
        Self::City,
        Self::GeometryReference,
        Self::Fares,
        Self::Access,
        Self::VehicleTypes,
        Self::Supervision,
    ];

    /// Key used for this field in creation and update payloads.
    #[must_use]
    pub const fn payload_key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Company => "company",
            Self::City => "city",
            Self::GeometryReference => "geometryName",
            Self::Fares => "fares",
            Self::Access => "access",
            Self::VehicleTypes => "vehicleTypes",
            Self::Supervision => "supervision",
        }
    }
}

/// The payload-shaped bag of current attribute values.
///
/// `None` means "never set" and is left out of serialized output. The same
/// shape doubles as a patch, where `None` means "absent from the payload".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAttributes {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Operating company.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// City.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Boundary geometry file; surfaced to consumers as `geometryName`.
    #[serde(rename = "geometryName", skip_serializing_if = "Option::is_none")]
    pub geometry_reference: Option<String>,
    /// Fares policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fares: Option<String>,
    /// Access policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    /// Vehicle types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_types: Option<Vec<String>>,
    /// Supervision policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervision: Option<String>,
}

impl ServiceAttributes {
    /// Whether `field` carries a value.
    #[must_use]
    pub fn is_set(&self, field: AttributeField) -> bool {
        match field {
            AttributeField::Name => self.name.is_some(),
            AttributeField::Company => self.company.is_some(),
            AttributeField::City => self.city.is_some(),
            AttributeField::GeometryReference => self.geometry_reference.is_some(),
            AttributeField::Fares => self.fares.is_some(),
            AttributeField::Access => self.access.is_some(),
            AttributeField::VehicleTypes => self.vehicle_types.is_some(),
            AttributeField::Supervision => self.supervision.is_some(),
        }
    }

    /// Shallow field overwrite restricted to `allowed`. Fields absent from
    /// `patch` and fields outside `allowed` are left untouched.
    pub fn merge(&mut self, patch: &Self, allowed: &[AttributeField]) {
        fn overwrite<T: Clone>(target: &mut Option<T>, value: Option<&T>) {
            if let Some(value) = value {
                *target = Some(value.clone());
            }
        }

        for field in allowed {
            match field {
                AttributeField::Name => overwrite(&mut self.name, patch.name.as_ref()),
                AttributeField::Company => overwrite(&mut self.company, patch.company.as_ref()),
                AttributeField::City => overwrite(&mut self.city, patch.city.as_ref()),
                AttributeField::GeometryReference => overwrite(
                    &mut self.geometry_reference,
                    patch.geometry_reference.as_ref(),
                ),
                AttributeField::Fares => overwrite(&mut self.fares, patch.fares.as_ref()),
                AttributeField::Access => overwrite(&mut self.access, patch.access.as_ref()),
                AttributeField::VehicleTypes => {
                    overwrite(&mut self.vehicle_types, patch.vehicle_types.as_ref());
                }
                AttributeField::Supervision => {
                    overwrite(&mut self.supervision, patch.supervision.as_ref());
                }
            }
        }
    }
}

/// The reconstructed state of one service area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateState {
    /// Aggregate identifier.
    pub aggregate_id: String,
    /// False once `service_ended` has been folded.
    pub is_active: bool,
    /// Date of the `service_created` that produced this state.
    pub effective_date: DateTime<Utc>,
    /// Date of the last event that changed this state.
    pub last_updated: DateTime<Utc>,
    /// Date the service ended, if it has.
    pub end_date: Option<DateTime<Utc>>,
    /// Current attribute values.
    pub attributes: ServiceAttributes,
}

impl AggregateState {
    fn created(aggregate_id: &str, date: DateTime<Utc>, payload: &ServiceCreated) -> Self {
        let mut attributes = ServiceAttributes::default();
        attributes.merge(&payload.attributes, &AttributeField::ALL);
        Self {
            aggregate_id: aggregate_id.to_owned(),
            is_active: true,
            effective_date: date,
            last_updated: date,
            end_date: None,
            attributes,
        }
    }

    fn ended(mut self, date: DateTime<Utc>) -> Self {
        if self.is_active {
            self.is_active = false;
            self.end_date = Some(date);
        }
        self
    }

    fn changed(mut self, kind: &ServiceAreaEventKind, date: DateTime<Utc>) -> Self {
        if self.is_active {
            self.attributes
                .merge(&kind.attribute_patch(), kind.touched_fields());
            self.last_updated = date;
        }
        self
    }
}

/// How a `service_created` for an already-active aggregate is folded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreationPolicy {
    /// Replace the active state wholesale, resetting `effective_date`.
    #[default]
    Overwrite,
    /// Ignore the duplicate creation; the active state is kept as is.
    KeepExisting,
}

/// The pure transition function `(state, event) -> state'`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceAreaStateMachine {
    creation_policy: CreationPolicy,
}

impl ServiceAreaStateMachine {
    /// Creates a state machine with the given creation policy.
    #[must_use]
    pub const fn new(creation_policy: CreationPolicy) -> Self {
        Self { creation_policy }
    }

    /// Returns the configured creation policy.
    #[must_use]
    pub const fn creation_policy(&self) -> CreationPolicy {
        self.creation_policy
    }

    /// Folds one event into the prior state of its aggregate.
    ///
    /// Total: every combination of prior state and event yields a result,
    /// and inapplicable events hand `prior` back unchanged.
    #[must_use]
    pub fn apply(
        &self,
        prior: Option<AggregateState>,
        event: &ServiceAreaEvent,
    ) -> Option<AggregateState> {
        let date = event.metadata.event_date;
        match &event.kind {
            ServiceAreaEventKind::ServiceCreated(payload) => match prior {
                Some(state)
                    if state.is_active && self.creation_policy == CreationPolicy::KeepExisting =>
                {
                    Some(state)
                }
                _ => Some(AggregateState::created(
                    &event.metadata.aggregate_id,
                    date,
                    payload,
                )),
            },
            ServiceAreaEventKind::ServiceEnded => prior.map(|state| state.ended(date)),
            kind @ (ServiceAreaEventKind::ServiceUpdated(_)
            | ServiceAreaEventKind::FaresPolicyChanged(_)
            | ServiceAreaEventKind::AccessPolicyChanged(_)
            | ServiceAreaEventKind::GeometryUpdated(_)
            | ServiceAreaEventKind::VehicleTypesUpdated(_)) => {
                prior.map(|state| state.changed(kind, date))
            }
            ServiceAreaEventKind::Unrecognized { .. } => prior,
        }
    }
}
