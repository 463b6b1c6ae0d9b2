//! Identifier newtypes.
//!
//! Record identifiers minted by daybook wrap a [`Uuid`] produced by an
//! injected [`crate::identity::IdGenerator`]. Identifiers owned by collaborators
//! (users, routines, calendar events, tasks) are opaque strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[must_use]
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }
    };
}

uuid_id!(
    /// Identifier of one [`crate::model::ActionableInstance`] row.
    InstanceId
);
uuid_id!(
    /// Identifier of one [`crate::model::InstanceNote`].
    NoteId
);
uuid_id!(
    /// Identifier of one [`crate::model::CoverageRequest`].
    CoverageRequestId
);

string_id!(
    /// Authenticated user, as issued by the session layer.
    UserId
);
string_id!(
    /// Routine or calendar-event id, as issued by its collaborator.
    EntityId
);
string_id!(
    /// One-shot task id, as issued by the task collaborator.
    TaskId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_id_parse_and_display() {
        let raw = Uuid::from_u128(42);
        let id = InstanceId::from_uuid(raw);
        let parsed: InstanceId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.as_uuid(), raw);
    }

    #[test]
    fn test_uuid_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<NoteId>().is_err());
    }

    #[test]
    fn test_string_id_serializes_transparently() {
        let user = UserId::new("alice");
        assert_eq!(serde_json::to_string(&user).unwrap(), "\"alice\"");
        let back: UserId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(back, user);
    }
}
