//! Core entity structures
//!
//! These mirror the documents held by the persistent store. The caching and
//! query layer only ever reads them or passes them through; mutation rules
//! live with the owning services.

use crate::{
    JobId, JobStatus, MessageId, MessageType, NotificationId, NotificationKind, Timestamp, UserId,
    UserRole,
};
use serde::{Deserialize, Serialize};

/// A platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    pub phone: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: UserRole,
    pub is_verified: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

/// A job posted by a client, optionally assigned to a freelancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub job_id: JobId,
    pub title: String,
    pub description: String,
    pub status: JobStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub client_id: UserId,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub freelancer_id: Option<UserId>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl Job {
    /// True when `user` is the job's client or its assigned freelancer.
    pub fn is_participant(&self, user: UserId) -> bool {
        self.client_id == user || self.freelancer_id == Some(user)
    }
}

/// File attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// A message inside a job conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub message_id: MessageId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub job_id: JobId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub sender_id: UserId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub receiver_id: UserId,
    pub message: String,
    pub message_type: MessageType,
    pub attachment: Option<Attachment>,
    pub is_read: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl Message {
    pub fn has_attachment(&self) -> bool {
        self.attachment.is_some()
    }

    /// True when this message is addressed to `user` and still unread.
    pub fn is_unread_for(&self, user: UserId) -> bool {
        self.receiver_id == user && !self.is_read
    }
}

/// A notification delivered to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub notification_id: NotificationId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub is_read: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// The authenticated caller, as supplied by the authentication gateway.
///
/// This layer never verifies credentials; it trusts whatever produced the
/// principal and only checks the role where an operation requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Principal {
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityIdType;
    use chrono::Utc;

    #[test]
    fn test_job_participants() {
        let client = UserId::new();
        let freelancer = UserId::new();
        let outsider = UserId::new();
        let job = Job {
            job_id: JobId::new(),
            title: "Fix sink".to_string(),
            description: "Kitchen sink leaks".to_string(),
            status: JobStatus::Assigned,
            client_id: client,
            freelancer_id: Some(freelancer),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(job.is_participant(client));
        assert!(job.is_participant(freelancer));
        assert!(!job.is_participant(outsider));
    }

    #[test]
    fn test_message_unread_only_counts_for_receiver() {
        let sender = UserId::new();
        let receiver = UserId::new();
        let message = Message {
            message_id: MessageId::new(),
            job_id: JobId::new(),
            sender_id: sender,
            receiver_id: receiver,
            message: "hello".to_string(),
            message_type: MessageType::Text,
            attachment: None,
            is_read: false,
            created_at: Utc::now(),
        };

        assert!(message.is_unread_for(receiver));
        assert!(!message.is_unread_for(sender));
        assert!(!message.has_attachment());
    }

    #[test]
    fn test_entities_serialize_camel_case() {
        let user = User {
            user_id: UserId::new(),
            phone: "+15550100".to_string(),
            email: None,
            display_name: None,
            role: UserRole::Freelancer,
            is_verified: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("isVerified").is_some());
        assert_eq!(json["role"], "freelancer");
    }
}
