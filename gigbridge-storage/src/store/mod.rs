//! Persistent store contract.
//!
//! The query layer talks to the system of record only through
//! [`MarketplaceStore`]: filtered find and count, a per-job conversation
//! roll-up, grouped counts, and the handful of writes that drive
//! invalidation. Implementations translate these into their own query
//! language.

mod memory;

pub use memory::InMemoryMarketplaceStore;

use async_trait::async_trait;
use gigbridge_core::{
    DateRange, Job, JobId, JobSortField, JobStatus, Message, MessageId, MessageSortField,
    MessageType, Notification, Pagination, SortDirection, StoreError, User, UserId, UserRole,
    UserSortField,
};
use serde::{Deserialize, Serialize};

/// Result alias for persistent store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Message predicates. All present predicates must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    /// Restrict to these jobs. `Some(vec![])` matches nothing.
    pub job_scope: Option<Vec<JobId>>,
    pub job_id: Option<JobId>,
    pub sender_id: Option<UserId>,
    pub receiver_id: Option<UserId>,
    pub message_type: Option<MessageType>,
    pub has_attachment: Option<bool>,
    /// Case-insensitive substring of the message text.
    pub text: Option<String>,
    pub created: DateRange,
    pub is_read: Option<bool>,
}

/// User predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    /// Case-insensitive substring of phone, email or display name.
    pub text: Option<String>,
    pub role: Option<UserRole>,
    pub is_verified: Option<bool>,
    pub created: DateRange,
}

/// Job predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    /// Jobs where this user is client or freelancer.
    pub participant: Option<UserId>,
    pub client_id: Option<UserId>,
    pub freelancer_id: Option<UserId>,
    pub status: Option<JobStatus>,
    /// Case-insensitive substring of the title.
    pub text: Option<String>,
    pub created: DateRange,
}

/// Sort specification for a find.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sort<F> {
    pub field: F,
    pub direction: SortDirection,
}

impl<F> Sort<F> {
    pub fn new(field: F, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

pub type MessageSort = Sort<MessageSortField>;
pub type UserSort = Sort<UserSortField>;
pub type JobSort = Sort<JobSortField>;

/// Which jobs' conversations to roll up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationScope {
    /// The viewer. Only jobs they participate in are included, and unread
    /// counts are computed from their side.
    pub participant: UserId,
    pub job_status: Option<JobStatus>,
}

/// Per-job grouping of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRollup {
    pub job_id: JobId,
    pub last_message: Message,
    pub message_count: u64,
    /// Messages addressed to the participant that are still unread.
    pub unread_count: u64,
}

/// Message grouping dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageFacet {
    MessageType,
    /// `0`..`23`, UTC.
    HourOfDay,
    Sender,
    MimeType,
    /// `read` / `unread`.
    ReadState,
}

/// User grouping dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserFacet {
    /// Users created in range, by role.
    Role,
    /// Users updated in range, as `verified` / `unverified`.
    Verification,
}

/// Notification grouping dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationFacet {
    Kind,
    /// `read` / `unread`.
    ReadState,
}

/// Grouped count request. The range applies to `created_at` unless the
/// facet says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Messages {
        by: MessageFacet,
        range: DateRange,
        attachments_only: bool,
    },
    Users {
        by: UserFacet,
        range: DateRange,
    },
    Notifications {
        by: NotificationFacet,
        range: DateRange,
    },
    JobStatus {
        range: DateRange,
    },
}

/// One group of an aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub key: String,
    pub count: u64,
    /// Sum of attachment sizes in the group; zero outside file facets.
    pub total_bytes: u64,
}

impl Bucket {
    pub fn new(key: impl Into<String>, count: u64, total_bytes: u64) -> Self {
        Self {
            key: key.into(),
            count,
            total_bytes,
        }
    }
}

/// Order buckets by count descending, then key ascending.
pub fn sort_buckets(buckets: &mut [Bucket]) {
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
}

pub const READ: &str = "read";
pub const UNREAD: &str = "unread";
pub const VERIFIED: &str = "verified";
pub const UNVERIFIED: &str = "unverified";

/// The system of record, as seen by the query layer.
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn user_get(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn job_get(&self, id: JobId) -> StoreResult<Option<Job>>;

    /// Jobs where `user` is client or freelancer, optionally by status.
    async fn jobs_for_participant(
        &self,
        user: UserId,
        status: Option<JobStatus>,
    ) -> StoreResult<Vec<Job>>;

    async fn job_find(
        &self,
        query: &JobQuery,
        sort: JobSort,
        page: Pagination,
    ) -> StoreResult<Vec<Job>>;

    async fn job_count(&self, query: &JobQuery) -> StoreResult<u64>;

    async fn message_find(
        &self,
        query: &MessageQuery,
        sort: MessageSort,
        page: Pagination,
    ) -> StoreResult<Vec<Message>>;

    async fn message_count(&self, query: &MessageQuery) -> StoreResult<u64>;

    async fn user_find(
        &self,
        query: &UserQuery,
        sort: UserSort,
        page: Pagination,
    ) -> StoreResult<Vec<User>>;

    async fn user_count(&self, query: &UserQuery) -> StoreResult<u64>;

    /// Group the participant's messages by job.
    async fn conversation_rollup(
        &self,
        scope: ConversationScope,
    ) -> StoreResult<Vec<ConversationRollup>>;

    /// Grouped counts, ordered by [`sort_buckets`].
    async fn aggregate(&self, aggregation: Aggregation) -> StoreResult<Vec<Bucket>>;

    async fn user_upsert(&self, user: &User) -> StoreResult<()>;

    async fn job_upsert(&self, job: &Job) -> StoreResult<()>;

    async fn message_insert(&self, message: &Message) -> StoreResult<()>;

    /// Mark every message in `job` addressed to `reader` as read.
    /// Returns the ids that changed.
    async fn messages_mark_read(&self, job: JobId, reader: UserId)
        -> StoreResult<Vec<MessageId>>;

    async fn notification_insert(&self, notification: &Notification) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_buckets() {
        let mut buckets = vec![
            Bucket::new("text", 3, 0),
            Bucket::new("file", 5, 0),
            Bucket::new("image", 3, 0),
        ];
        sort_buckets(&mut buckets);
        let keys: Vec<&str> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["file", "image", "text"]);
    }
}
