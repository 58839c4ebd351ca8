//! Identity types for GigBridge entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behaviour for strongly-typed entity identifiers.
///
/// Every id is a UUIDv7 underneath, so ids sort by creation time.
pub trait EntityIdType: Copy + Eq + std::hash::Hash + fmt::Display {
    /// Entity name used in error messages.
    const ENTITY_NAME: &'static str;

    /// Generate a fresh identifier.
    fn new() -> Self;

    /// Wrap an existing UUID.
    fn from_uuid(uuid: Uuid) -> Self;

    /// Get the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// The nil identifier.
    fn nil() -> Self {
        Self::from_uuid(Uuid::nil())
    }
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new() -> Self {
                Self(Uuid::now_v7())
            }

            fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
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

define_entity_id!(
    /// Identifier of a platform user (client, freelancer or admin).
    UserId,
    "user"
);
define_entity_id!(
    /// Identifier of a posted job.
    JobId,
    "job"
);
define_entity_id!(
    /// Identifier of a message exchanged inside a job conversation.
    MessageId,
    "message"
);
define_entity_id!(
    /// Identifier of a user notification.
    NotificationId,
    "notification"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let first = MessageId::new();
        let second = MessageId::new();
        assert_ne!(first, second);
        assert_eq!(first.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn test_id_parse_roundtrip() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_id_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_id_serializes_as_plain_uuid() {
        let id = JobId::from_uuid(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
        assert_eq!(JobId::nil(), id);
        assert_eq!(JobId::ENTITY_NAME, "job");
    }
}
