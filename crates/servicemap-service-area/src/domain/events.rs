//! Domain events for the Service Area context.
//!
//! The set of kinds is closed. Anything else a producer writes decodes to
//! [`ServiceAreaEventKind::Unrecognized`] and replays as a no-op, so old
//! projector code keeps working when new kinds appear in the log.

use serde_json::{Map, Value};
use servicemap_core::event::{DomainEvent, EventMetadata};
use servicemap_core::repository::StoredEvent;
use uuid::Uuid;

use super::aggregates::{AttributeField, ServiceAttributes};

/// Aggregate type namespace for service areas.
pub const SERVICE_AREA_AGGREGATE_TYPE: &str = "service_area";

/// Event type name for `ServiceCreated`.
pub const SERVICE_CREATED_EVENT_TYPE: &str = "service_created";
/// Event type name for `ServiceEnded`.
pub const SERVICE_ENDED_EVENT_TYPE: &str = "service_ended";
/// Event type name for `ServiceUpdated`.
pub const SERVICE_UPDATED_EVENT_TYPE: &str = "service_updated";
/// Event type name for `FaresPolicyChanged`.
pub const FARES_POLICY_CHANGED_EVENT_TYPE: &str = "fares_policy_changed";
/// Event type name for `AccessPolicyChanged`.
pub const ACCESS_POLICY_CHANGED_EVENT_TYPE: &str = "access_policy_changed";
/// Event type name for `GeometryUpdated`.
pub const GEOMETRY_UPDATED_EVENT_TYPE: &str = "geometry_updated";
/// Event type name for `VehicleTypesUpdated`.
pub const VEHICLE_TYPES_UPDATED_EVENT_TYPE: &str = "vehicle_types_updated";

/// Emitted when a service area starts operating (or restarts after ending).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCreated {
    /// Initial attribute values; absent keys stay unset.
    pub attributes: ServiceAttributes,
}

/// Emitted when any subset of attributes is edited at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceUpdated {
    /// Attribute values to overwrite; absent keys leave state untouched.
    pub attributes: ServiceAttributes,
}

/// Emitted when the fares policy changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaresPolicyChanged {
    /// The new fares policy, from `newFares`.
    pub new_fares: Option<String>,
}

/// Emitted when the rider access policy changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicyChanged {
    /// The new access policy, from `newAccess`.
    pub new_access: Option<String>,
}

/// Emitted when the service boundary is redrawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeometryUpdated {
    /// Name of the new geometry file, from `newGeometryName`.
    pub new_geometry_name: Option<String>,
}

/// Emitted when the operated vehicle types change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleTypesUpdated {
    /// The new vehicle types, from `newVehicleTypes`.
    pub new_vehicle_types: Option<Vec<String>>,
}

/// Event payload variants for the Service Area context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAreaEventKind {
    /// The service area became active.
    ServiceCreated(ServiceCreated),
    /// The service area stopped operating.
    ServiceEnded,
    /// Several attributes changed at once.
    ServiceUpdated(ServiceUpdated),
    /// The fares policy changed.
    FaresPolicyChanged(FaresPolicyChanged),
    /// The access policy changed.
    AccessPolicyChanged(AccessPolicyChanged),
    /// The geometry reference changed.
    GeometryUpdated(GeometryUpdated),
    /// The vehicle types changed.
    VehicleTypesUpdated(VehicleTypesUpdated),
    /// A kind this projector does not know.
    Unrecognized {
        /// The event type as written by the producer.
        event_type: String,
    },
}

impl ServiceAreaEventKind {
    /// The attribute fields this kind is allowed to write.
    #[must_use]
    pub fn touched_fields(&self) -> &'static [AttributeField] {
        match self {
            Self::ServiceCreated(_) | Self::ServiceUpdated(_) => &AttributeField::ALL,
            Self::FaresPolicyChanged(_) => &[AttributeField::Fares],
            Self::AccessPolicyChanged(_) => &[AttributeField::Access],
            Self::GeometryUpdated(_) => &[AttributeField::GeometryReference],
            Self::VehicleTypesUpdated(_) => &[AttributeField::VehicleTypes],
            Self::ServiceEnded | Self::Unrecognized { .. } => &[],
        }
    }

    /// The payload expressed as an attribute patch. Fields outside
    /// [`Self::touched_fields`] are always `None`.
    #[must_use]
    pub fn attribute_patch(&self) -> ServiceAttributes {
        match self {
            Self::ServiceCreated(ServiceCreated { attributes })
            | Self::ServiceUpdated(ServiceUpdated { attributes }) => attributes.clone(),
            Self::FaresPolicyChanged(payload) => ServiceAttributes {
                fares: payload.new_fares.clone(),
                ..ServiceAttributes::default()
            },
            Self::AccessPolicyChanged(payload) => ServiceAttributes {
                access: payload.new_access.clone(),
                ..ServiceAttributes::default()
            },
            Self::GeometryUpdated(payload) => ServiceAttributes {
                geometry_reference: payload.new_geometry_name.clone(),
                ..ServiceAttributes::default()
            },
            Self::VehicleTypesUpdated(payload) => ServiceAttributes {
                vehicle_types: payload.new_vehicle_types.clone(),
                ..ServiceAttributes::default()
            },
            Self::ServiceEnded | Self::Unrecognized { .. } => ServiceAttributes::default(),
        }
    }
}

/// Domain event envelope for the Service Area context.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAreaEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: ServiceAreaEventKind,
}

impl ServiceAreaEvent {
    /// Decodes a stored event. Never fails: unknown kinds become
    /// `Unrecognized` and malformed payload fields decode as absent.
    #[must_use]
    pub fn decode(stored: StoredEvent) -> Self {
        let reader = PayloadReader::new(stored.metadata.event_id, &stored.payload);
        let kind = match stored.event_type.as_str() {
            SERVICE_CREATED_EVENT_TYPE => ServiceAreaEventKind::ServiceCreated(ServiceCreated {
                attributes: reader.attributes(),
            }),
            SERVICE_ENDED_EVENT_TYPE => ServiceAreaEventKind::ServiceEnded,
            SERVICE_UPDATED_EVENT_TYPE => ServiceAreaEventKind::ServiceUpdated(ServiceUpdated {
                attributes: reader.attributes(),
            }),
            FARES_POLICY_CHANGED_EVENT_TYPE => {
                ServiceAreaEventKind::FaresPolicyChanged(FaresPolicyChanged {
                    new_fares: reader.string("newFares"),
                })
            }
            ACCESS_POLICY_CHANGED_EVENT_TYPE => {
                ServiceAreaEventKind::AccessPolicyChanged(AccessPolicyChanged {
                    new_access: reader.string("newAccess"),
                })
            }
            GEOMETRY_UPDATED_EVENT_TYPE => ServiceAreaEventKind::GeometryUpdated(GeometryUpdated {
                new_geometry_name: reader.string("newGeometryName"),
            }),
            VEHICLE_TYPES_UPDATED_EVENT_TYPE => {
                ServiceAreaEventKind::VehicleTypesUpdated(VehicleTypesUpdated {
                    new_vehicle_types: reader.string_list("newVehicleTypes"),
                })
            }
            other => {
                tracing::debug!(
                    event_id = %stored.metadata.event_id,
                    event_type = other,
                    "unrecognized event kind, replayed as no-op"
                );
                ServiceAreaEventKind::Unrecognized {
                    event_type: other.to_owned(),
                }
            }
        };
        Self {
            metadata: stored.metadata,
            kind,
        }
    }
}

impl DomainEvent for ServiceAreaEvent {
    fn event_type(&self) -> &str {
        match &self.kind {
            ServiceAreaEventKind::ServiceCreated(_) => SERVICE_CREATED_EVENT_TYPE,
            ServiceAreaEventKind::ServiceEnded => SERVICE_ENDED_EVENT_TYPE,
            ServiceAreaEventKind::ServiceUpdated(_) => SERVICE_UPDATED_EVENT_TYPE,
            ServiceAreaEventKind::FaresPolicyChanged(_) => FARES_POLICY_CHANGED_EVENT_TYPE,
            ServiceAreaEventKind::AccessPolicyChanged(_) => ACCESS_POLICY_CHANGED_EVENT_TYPE,
            ServiceAreaEventKind::GeometryUpdated(_) => GEOMETRY_UPDATED_EVENT_TYPE,
            ServiceAreaEventKind::VehicleTypesUpdated(_) => VEHICLE_TYPES_UPDATED_EVENT_TYPE,
            ServiceAreaEventKind::Unrecognized { event_type } => event_type,
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Lenient field access over a JSON payload.
struct PayloadReader<'a> {
    event_id: Uuid,
    object: Option<&'a Map<String, Value>>,
}

impl<'a> PayloadReader<'a> {
    fn new(event_id: Uuid, payload: &'a Value) -> Self {
        let object = match payload {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                tracing::warn!(%event_id, payload = %other, "event payload is not an object");
                None
            }
        };
        Self { event_id, object }
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        self.object
            .and_then(|map| map.get(key))
            .filter(|value| !value.is_null())
    }

    fn malformed(&self, key: &str, value: &Value) {
        tracing::warn!(
            event_id = %self.event_id,
            field = key,
            value = %value,
            "malformed payload field ignored"
        );
    }

    fn string(&self, key: &str) -> Option<String> {
        match self.present(key)? {
            Value::String(s) => Some(s.clone()),
            other => {
                self.malformed(key, other);
                None
            }
        }
    }

    fn string_list(&self, key: &str) -> Option<Vec<String>> {
        let value = self.present(key)?;
        let list = value.as_array().and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
        });
        if list.is_none() {
            self.malformed(key, value);
        }
        list
    }

    fn attributes(&self) -> ServiceAttributes {
        let mut attributes = ServiceAttributes::default();
        for field in AttributeField::ALL {
            match field {
                AttributeField::Name => attributes.name = self.string(field.payload_key()),
                AttributeField::Company => attributes.company = self.string(field.payload_key()),
                AttributeField::City => attributes.city = self.string(field.payload_key()),
                AttributeField::GeometryReference => {
                    attributes.geometry_reference = self
                        .string(field.payload_key())
                        .or_else(|| self.string("geometryReference"));
                }
                AttributeField::Fares => attributes.fares = self.string(field.payload_key()),
                AttributeField::Access => attributes.access = self.string(field.payload_key()),
                AttributeField::VehicleTypes => {
                    attributes.vehicle_types = self.string_list(field.payload_key());
                }
                AttributeField::Supervision => {
                    attributes.supervision = self.string(field.payload_key());
                }
            }
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use servicemap_test_support::{at, stored_event};

    fn decode(event_type: &str, payload: Value) -> ServiceAreaEvent {
        ServiceAreaEvent::decode(stored_event("phx", event_type, at(2025, 1, 1), 1, payload))
    }

    #[test]
    fn test_decode_service_created_reads_every_attribute() {
        // Arrange
        let payload = json!({
            "name": "Phoenix Metro",
            "company": "Waymo",
            "city": "Phoenix",
            "geometryName": "phx-2025-01.geojson",
            "fares": "paid",
            "access": "public",
            "vehicleTypes": ["Jaguar I-PACE"],
            "supervision": "driverless"
        });

        // Act
        let event = decode(SERVICE_CREATED_EVENT_TYPE, payload);

        // Assert
        match event.kind {
            ServiceAreaEventKind::ServiceCreated(ServiceCreated { attributes }) => {
                assert_eq!(attributes.name.as_deref(), Some("Phoenix Metro"));
                assert_eq!(attributes.company.as_deref(), Some("Waymo"));
                assert_eq!(attributes.city.as_deref(), Some("Phoenix"));
                assert_eq!(
                    attributes.geometry_reference.as_deref(),
                    Some("phx-2025-01.geojson")
                );
                assert_eq!(attributes.fares.as_deref(), Some("paid"));
                assert_eq!(attributes.access.as_deref(), Some("public"));
                assert_eq!(
                    attributes.vehicle_types,
                    Some(vec!["Jaguar I-PACE".to_owned()])
                );
                assert_eq!(attributes.supervision.as_deref(), Some("driverless"));
            }
            other => panic!("expected ServiceCreated, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_accepts_geometry_reference_alias() {
        let event = decode(
            SERVICE_UPDATED_EVENT_TYPE,
            json!({"geometryReference": "sf-v2.geojson"}),
        );

        assert_eq!(
            event.kind.attribute_patch().geometry_reference.as_deref(),
            Some("sf-v2.geojson")
        );
    }

    #[test]
    fn test_decode_treats_wrongly_typed_fields_as_absent() {
        // Arrange
        let payload = json!({
            "company": 42,
            "fares": "free",
            "vehicleTypes": ["Zoox", 7]
        });

        // Act
        let patch = decode(SERVICE_UPDATED_EVENT_TYPE, payload)
            .kind
            .attribute_patch();

        // Assert
        assert_eq!(patch.company, None);
        assert_eq!(patch.fares.as_deref(), Some("free"));
        assert_eq!(patch.vehicle_types, None);
    }

    #[test]
    fn test_decode_non_object_payload_yields_empty_patch() {
        let event = decode(SERVICE_CREATED_EVENT_TYPE, json!("not an object"));

        assert_eq!(event.kind.attribute_patch(), ServiceAttributes::default());
    }

    #[test]
    fn test_decode_missing_payload_field_is_none() {
        let event = decode(FARES_POLICY_CHANGED_EVENT_TYPE, json!({"fares": "free"}));

        assert_eq!(
            event.kind,
            ServiceAreaEventKind::FaresPolicyChanged(FaresPolicyChanged { new_fares: None })
        );
    }

    #[test]
    fn test_decode_unknown_kind_is_unrecognized_and_keeps_its_name() {
        // Act
        let event = decode("service_paused", json!({"reason": "weather"}));

        // Assert
        assert_eq!(event.event_type(), "service_paused");
        assert!(event.kind.touched_fields().is_empty());
        assert!(matches!(
            event.kind,
            ServiceAreaEventKind::Unrecognized { .. }
        ));
    }

    #[test]
    fn test_attribute_change_kinds_patch_only_their_declared_field() {
        // Arrange
        let kinds = [
            decode(FARES_POLICY_CHANGED_EVENT_TYPE, json!({"newFares": "free"})),
            decode(ACCESS_POLICY_CHANGED_EVENT_TYPE, json!({"newAccess": "waitlist"})),
            decode(GEOMETRY_UPDATED_EVENT_TYPE, json!({"newGeometryName": "g2"})),
            decode(
                VEHICLE_TYPES_UPDATED_EVENT_TYPE,
                json!({"newVehicleTypes": ["Zeekr"]}),
            ),
        ];

        for event in kinds {
            // Act
            let patch = event.kind.attribute_patch();
            let touched = event.kind.touched_fields();

            // Assert
            assert_eq!(touched.len(), 1);
            for field in AttributeField::ALL {
                assert_eq!(
                    patch.is_set(field),
                    touched.contains(&field),
                    "{field:?} for {}",
                    event.event_type()
                );
            }
        }
    }
}
