//! Opaque entity identifiers.
//!
//! Every entity is keyed by a UUID v4 wrapped in its own newtype so a queue id
//! can never be passed where a ticket id is expected. Identifiers serialise as
//! their hyphenated string form.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation errors raised when parsing identifiers from strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdValidationError {
    /// The raw identifier was empty.
    #[error("{kind} id must not be empty")]
    Empty {
        /// Entity kind the identifier belongs to.
        kind: &'static str,
    },
    /// The raw identifier was not a canonical UUID.
    #[error("{kind} id must be a valid UUID")]
    Invalid {
        /// Entity kind the identifier belongs to.
        kind: &'static str,
    },
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident => $kind:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            /// Validate and construct an identifier from its string form.
            pub fn new(id: impl AsRef<str>) -> Result<Self, IdValidationError> {
                let raw = id.as_ref();
                if raw.is_empty() {
                    return Err(IdValidationError::Empty { kind: $kind });
                }
                if raw.trim() != raw {
                    return Err(IdValidationError::Invalid { kind: $kind });
                }
                Uuid::parse_str(raw)
                    .map(Self)
                    .map_err(|_| IdValidationError::Invalid { kind: $kind })
            }

            /// Generate a new random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID, e.g. one loaded from storage.
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Access the underlying UUID.
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }
    };
}

define_entity_id! {
    /// Stable identifier of an authenticated user, resolved by the auth layer.
    UserId => "user"
}

define_entity_id! {
    /// Identifier of a physical place offering queues.
    PlaceId => "place"
}

define_entity_id! {
    /// Identifier of one queue belonging to a place.
    QueueId => "queue"
}

define_entity_id! {
    /// Identifier of one ticket issued by a queue.
    TicketId => "ticket"
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn parses_canonical_uuid() {
        let raw = "3fa85f64-5717-4562-b3fc-2c963f66afa6";
        let id = TicketId::new(raw).expect("valid ticket id");
        assert_eq!(id.to_string(), raw);
    }

    #[rstest]
    #[case("", IdValidationError::Empty { kind: "queue" })]
    #[case(" 3fa85f64-5717-4562-b3fc-2c963f66afa6", IdValidationError::Invalid { kind: "queue" })]
    #[case("not-a-uuid", IdValidationError::Invalid { kind: "queue" })]
    fn rejects_malformed_ids(#[case] raw: &str, #[case] expected: IdValidationError) {
        assert_eq!(QueueId::new(raw), Err(expected));
    }

    #[rstest]
    fn serde_uses_string_form() {
        let id = UserId::random();
        let json = serde_json::to_string(&id).expect("serialise id");
        assert_eq!(json, format!("\"{id}\""));

        let decoded: UserId = serde_json::from_str(&json).expect("deserialise id");
        assert_eq!(decoded, id);
    }

    #[rstest]
    fn serde_rejects_invalid_strings() {
        let result = serde_json::from_str::<PlaceId>("\"nope\"");
        assert!(result.is_err());
    }
}
