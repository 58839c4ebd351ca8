//! Enum types for GigBridge entities and query shapes

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}', expected one of: {}", expected.join(", "))]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static [&'static str],
}

/// Generates `as_str`, `ALL`, `Display` and case-insensitive `FromStr` for a
/// fieldless enum whose wire names are given explicitly.
macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire names accepted by `FromStr`.
            pub const WIRE_NAMES: &'static [&'static str] = &[$($wire),+];

            /// Wire representation used in query strings, cache keys and SQL.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($wire) {
                        return Ok($name::$variant);
                    }
                )+
                Err($crate::ParseEnumError {
                    kind: $kind,
                    value: s.to_string(),
                    expected: Self::WIRE_NAMES,
                })
            }
        }
    };
}

/// Role of a platform user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Posts jobs
    Client,
    /// Fulfills jobs
    Freelancer,
    /// Platform operator
    Admin,
}

wire_enum!(UserRole, "role", {
    Client => "client",
    Freelancer => "freelancer",
    Admin => "admin",
});

/// Lifecycle status of a job. Transitions are owned by the job service, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

wire_enum!(JobStatus, "job status", {
    Pending => "pending",
    Assigned => "assigned",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// Content type of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    File,
}

wire_enum!(MessageType, "message type", {
    Text => "text",
    Image => "image",
    File => "file",
});

/// Category of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    JobUpdate,
    Payment,
    System,
}

wire_enum!(NotificationKind, "notification kind", {
    Message => "message",
    JobUpdate => "job_update",
    Payment => "payment",
    System => "system",
});

/// Cache namespace discriminator. Every cache key starts with one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Job,
    Message,
    Conversation,
    Notification,
    Analytics,
    Suggestion,
}

wire_enum!(EntityKind, "entity kind", {
    User => "user",
    Job => "job",
    Message => "message",
    Conversation => "conversation",
    Notification => "notification",
    Analytics => "analytics",
    Suggestion => "suggestion",
});

/// Sort direction for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

wire_enum!(SortDirection, "sort order", {
    Asc => "asc",
    Desc => "desc",
});

impl SortDirection {
    /// Apply this direction to an ascending ordering.
    pub fn apply(&self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Sortable fields for message search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum MessageSortField {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "message")]
    Message,
    #[serde(rename = "senderId")]
    SenderId,
}

wire_enum!(MessageSortField, "message sort field", {
    CreatedAt => "createdAt",
    Message => "message",
    SenderId => "senderId",
});

/// Sortable fields for conversation search. All are computed after grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ConversationSortField {
    #[default]
    #[serde(rename = "lastMessageAt")]
    LastMessageAt,
    #[serde(rename = "messageCount")]
    MessageCount,
    #[serde(rename = "unreadCount")]
    UnreadCount,
}

wire_enum!(ConversationSortField, "conversation sort field", {
    LastMessageAt => "lastMessageAt",
    MessageCount => "messageCount",
    UnreadCount => "unreadCount",
});

/// Sortable fields for user search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum UserSortField {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "phone")]
    Phone,
    #[serde(rename = "role")]
    Role,
}

wire_enum!(UserSortField, "user sort field", {
    CreatedAt => "createdAt",
    Phone => "phone",
    Role => "role",
});

/// Sortable fields for job listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum JobSortField {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "updatedAt")]
    UpdatedAt,
    #[serde(rename = "title")]
    Title,
}

wire_enum!(JobSortField, "job sort field", {
    CreatedAt => "createdAt",
    UpdatedAt => "updatedAt",
    Title => "title",
});

/// Target of an autocomplete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    #[default]
    Messages,
    Jobs,
    Users,
}

wire_enum!(SuggestionKind, "suggestion type", {
    Messages => "messages",
    Jobs => "jobs",
    Users => "users",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("CLIENT".parse::<UserRole>().unwrap(), UserRole::Client);
        assert_eq!(" In_Progress ".parse::<JobStatus>().unwrap(), JobStatus::InProgress);
        assert_eq!("createdat".parse::<MessageSortField>().unwrap(), MessageSortField::CreatedAt);
    }

    #[test]
    fn test_parse_error_lists_expected_values() {
        let err = "video".parse::<MessageType>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("video"));
        assert!(msg.contains("text, image, file"));
    }

    #[test]
    fn test_wire_names_match_serde() {
        for status in JobStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        for field in ConversationSortField::ALL {
            let json = serde_json::to_string(field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.as_str()));
        }
    }

    #[test]
    fn test_sort_direction_apply() {
        use std::cmp::Ordering;
        assert_eq!(SortDirection::Asc.apply(Ordering::Less), Ordering::Less);
        assert_eq!(SortDirection::Desc.apply(Ordering::Less), Ordering::Greater);
        assert_eq!(SortDirection::default(), SortDirection::Desc);
    }
}
