use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each identifier is a distinct type so a slot id can never be passed
/// where a booking id is expected.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a bookable time slot.
    SlotId
);

define_id!(
    /// Identifier of a booking record.
    BookingId
);

define_id!(
    /// Identifier of a patient record in the patient directory.
    PatientId
);

define_id!(
    /// Authenticated subject id supplied by the caller identity collaborator.
    UserId
);

define_id!(
    /// Identifier of a clinic.
    ClinicId
);

define_id!(
    /// Identifier of a clinic service (consultation, lab test, ...).
    ServiceId
);

define_id!(
    /// Identifier of a journaled compensating action.
    CompensationId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_unique_ids() {
        let id1 = SlotId::new();
        let id2 = SlotId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = BookingId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
    }

    #[test]
    fn parses_from_string() {
        let uuid = Uuid::new_v4();
        let id: PatientId = uuid.to_string().parse().unwrap();
        assert_eq!(id.as_uuid(), uuid);
        assert!("not-a-uuid".parse::<PatientId>().is_err());
    }

    #[test]
    fn display_matches_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(UserId::from(uuid).to_string(), uuid.to_string());
    }

    #[test]
    fn serializes_transparently() {
        let id = ClinicId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
        let deserialized: ClinicId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
