//! GigBridge Test Utilities
//!
//! Centralized test infrastructure for the GigBridge workspace:
//! - Proptest generators for entities and filters
//! - Fixtures for seeded marketplaces and cache stacks
//! - Custom assertions for GigBridge error shapes

pub use gigbridge_storage::{CacheAside, InMemoryCacheStore, InMemoryMarketplaceStore};

pub use gigbridge_core::{
    Attachment, DateRange, EntityIdType, GigError, GigResult, Job, JobId, JobStatus, Message,
    MessageId, MessageType, Notification, NotificationId, NotificationKind, Pagination,
    PaginationMeta, Principal, SortDirection, Timestamp, User, UserId, UserRole,
};

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating GigBridge entity types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Type Generators ===

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_uuid().prop_map(UserId::from_uuid)
    }

    pub fn arb_job_id() -> impl Strategy<Value = JobId> {
        arb_uuid().prop_map(JobId::from_uuid)
    }

    /// Timestamps between 2020 and 2030, whole seconds.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    // === Enum Generators ===

    pub fn arb_user_role() -> impl Strategy<Value = UserRole> {
        prop_oneof![
            Just(UserRole::Client),
            Just(UserRole::Freelancer),
            Just(UserRole::Admin),
        ]
    }

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Pending),
            Just(JobStatus::Assigned),
            Just(JobStatus::InProgress),
            Just(JobStatus::Completed),
            Just(JobStatus::Cancelled),
        ]
    }

    pub fn arb_message_type() -> impl Strategy<Value = MessageType> {
        prop_oneof![
            Just(MessageType::Text),
            Just(MessageType::Image),
            Just(MessageType::File),
        ]
    }

    pub fn arb_sort_direction() -> impl Strategy<Value = SortDirection> {
        prop_oneof![Just(SortDirection::Asc), Just(SortDirection::Desc)]
    }

    /// Always-valid pagination.
    pub fn arb_pagination() -> impl Strategy<Value = Pagination> {
        (1u32..20, 1u32..=100)
            .prop_map(|(page, limit)| Pagination::new(page, limit).unwrap_or_default())
    }

    // === Entity Generators ===

    pub fn arb_attachment() -> impl Strategy<Value = Attachment> {
        (
            "[a-z]{1,12}",
            prop_oneof![
                Just("image/png".to_string()),
                Just("image/jpeg".to_string()),
                Just("application/pdf".to_string()),
            ],
            1u64..10_000_000,
        )
            .prop_map(|(stem, mime_type, size_bytes)| Attachment {
                url: format!("https://files.gigbridge.test/{stem}"),
                file_name: stem,
                mime_type,
                size_bytes,
            })
    }

    pub fn arb_user() -> impl Strategy<Value = User> {
        (
            arb_user_id(),
            "\\+1555[0-9]{7}",
            proptest::option::of("[a-z]{3,10}@example\\.com"),
            arb_user_role(),
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(|(user_id, phone, email, role, is_verified, created_at)| User {
                user_id,
                phone,
                email,
                display_name: None,
                role,
                is_verified,
                created_at,
                updated_at: created_at,
            })
    }

    /// Messages inside `job`, sent in either direction between its parties.
    pub fn arb_message_in(job: Job) -> impl Strategy<Value = Message> {
        let freelancer = job.freelancer_id.unwrap_or_else(UserId::nil);
        (
            any::<bool>(),
            "[a-zA-Z ]{1,40}",
            arb_message_type(),
            proptest::option::of(arb_attachment()),
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(
                move |(from_client, message, message_type, attachment, is_read, created_at)| {
                    let (sender_id, receiver_id) = if from_client {
                        (job.client_id, freelancer)
                    } else {
                        (freelancer, job.client_id)
                    };
                    Message {
                        message_id: MessageId::new(),
                        job_id: job.job_id,
                        sender_id,
                        receiver_id,
                        message,
                        message_type,
                        attachment,
                        is_read,
                        created_at,
                    }
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Fixed reference instant: 2024-06-01T12:00:00Z.
    pub fn base_time() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// `base_time()` shifted by whole minutes.
    pub fn minutes(offset: i64) -> Timestamp {
        base_time() + chrono::Duration::minutes(offset)
    }

    pub fn user(role: UserRole, phone: &str) -> User {
        User {
            user_id: UserId::new(),
            phone: phone.to_string(),
            email: None,
            display_name: None,
            role,
            is_verified: false,
            created_at: base_time(),
            updated_at: base_time(),
        }
    }

    pub fn principal(user: &User) -> Principal {
        Principal::new(user.user_id, user.role)
    }

    pub fn job_between(client: &User, freelancer: Option<&User>, status: JobStatus, title: &str) -> Job {
        Job {
            job_id: JobId::new(),
            title: title.to_string(),
            description: format!("{title} description"),
            status,
            client_id: client.user_id,
            freelancer_id: freelancer.map(|f| f.user_id),
            created_at: base_time(),
            updated_at: base_time(),
        }
    }

    pub fn message(job: &Job, from: UserId, to: UserId, text: &str, created_at: Timestamp) -> Message {
        Message {
            message_id: MessageId::new(),
            job_id: job.job_id,
            sender_id: from,
            receiver_id: to,
            message: text.to_string(),
            message_type: MessageType::Text,
            attachment: None,
            is_read: false,
            created_at,
        }
    }

    pub fn attachment(mime_type: &str, size_bytes: u64) -> Attachment {
        Attachment {
            url: format!("https://files.gigbridge.test/{size_bytes}"),
            file_name: format!("upload-{size_bytes}"),
            mime_type: mime_type.to_string(),
            size_bytes,
        }
    }

    /// `message` carrying an attachment, typed by its mime type.
    pub fn file_message(
        job: &Job,
        from: UserId,
        to: UserId,
        mime_type: &str,
        size_bytes: u64,
        created_at: Timestamp,
    ) -> Message {
        let message_type = if mime_type.starts_with("image/") {
            MessageType::Image
        } else {
            MessageType::File
        };
        Message {
            message_type,
            attachment: Some(attachment(mime_type, size_bytes)),
            ..message(job, from, to, "attached", created_at)
        }
    }

    pub fn notification(user: UserId, kind: NotificationKind, is_read: bool, created_at: Timestamp) -> Notification {
        Notification {
            notification_id: NotificationId::new(),
            user_id: user,
            kind,
            title: format!("{kind} notification"),
            is_read,
            created_at,
        }
    }

    /// In-memory cache store plus a cache-aside policy over it.
    pub fn cache(compute_timeout: Duration) -> (Arc<InMemoryCacheStore>, CacheAside) {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = CacheAside::new(store.clone(), compute_timeout);
        (store, cache)
    }

    /// A seeded marketplace: one client and one freelancer sharing a job,
    /// plus an admin and an outsider with no jobs.
    pub struct Marketplace {
        pub store: Arc<InMemoryMarketplaceStore>,
        pub client: User,
        pub freelancer: User,
        pub admin: User,
        pub outsider: User,
        pub job: Job,
    }

    impl Marketplace {
        pub fn two_party() -> Self {
            let store = Arc::new(InMemoryMarketplaceStore::new());
            let client = user(UserRole::Client, "+15550000001");
            let freelancer = user(UserRole::Freelancer, "+15550000002");
            let admin = user(UserRole::Admin, "+15550000003");
            let outsider = user(UserRole::Client, "+15550000004");
            let job = job_between(&client, Some(&freelancer), JobStatus::Assigned, "Fix kitchen sink");

            store
                .insert_users([client.clone(), freelancer.clone(), admin.clone(), outsider.clone()])
                .unwrap_or_default();
            store.insert_jobs([job.clone()]).unwrap_or_default();

            Self {
                store,
                client,
                freelancer,
                admin,
                outsider,
                job,
            }
        }

        /// Add `count` client-to-freelancer text messages one minute apart.
        pub fn seed_messages(&self, count: usize) -> Vec<Message> {
            let messages: Vec<Message> = (0..count)
                .map(|i| {
                    message(
                        &self.job,
                        self.client.user_id,
                        self.freelancer.user_id,
                        &format!("update {i}"),
                        minutes(i as i64),
                    )
                })
                .collect();
            self.store
                .insert_messages(messages.clone())
                .unwrap_or_default();
            messages
        }

        /// Add a second job for the same client with its own freelancer.
        pub fn add_job(&self, title: &str, status: JobStatus) -> (Job, User) {
            let freelancer = user(UserRole::Freelancer, "+15550000099");
            let job = job_between(&self.client, Some(&freelancer), status, title);
            self.store
                .insert_users([freelancer.clone()])
                .unwrap_or_default();
            self.store.insert_jobs([job.clone()]).unwrap_or_default();
            (job, freelancer)
        }

        pub fn client_principal(&self) -> Principal {
            principal(&self.client)
        }

        pub fn freelancer_principal(&self) -> Principal {
            principal(&self.freelancer)
        }

        pub fn admin_principal(&self) -> Principal {
            principal(&self.admin)
        }

        pub fn outsider_principal(&self) -> Principal {
            principal(&self.outsider)
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for GigBridge-specific result shapes.

    use super::*;
    use gigbridge_core::AuthorizationError;

    #[track_caller]
    pub fn assert_admin_required<T: std::fmt::Debug>(result: &GigResult<T>) {
        match result {
            Err(GigError::Authorization(AuthorizationError::AdminRequired { .. })) => {}
            other => panic!("Expected AdminRequired error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation_field<T: std::fmt::Debug>(result: &GigResult<T>, field: &str) {
        match result {
            Err(GigError::Validation(errors)) => {
                assert!(
                    errors.has_field(field),
                    "Expected a violation on {field}, got: {errors}"
                );
            }
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// `pages == ceil(total / limit)` and the echoed page/limit match.
    #[track_caller]
    pub fn assert_page_meta(meta: &PaginationMeta, page: u32, limit: u32, total: u64) {
        assert_eq!(meta.page, page, "Wrong page");
        assert_eq!(meta.limit, limit, "Wrong limit");
        assert_eq!(meta.total, total, "Wrong total");
        assert_eq!(meta.pages, total.div_ceil(u64::from(limit)), "Wrong page count");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_two_party_fixture() {
        let market = fixtures::Marketplace::two_party();
        assert!(market.job.is_participant(market.client.user_id));
        assert!(market.job.is_participant(market.freelancer.user_id));
        assert!(!market.job.is_participant(market.outsider.user_id));
        assert!(market.admin_principal().is_admin());

        let seeded = market.seed_messages(3);
        assert_eq!(seeded.len(), 3);
        assert!(seeded[0].created_at < seeded[2].created_at);
    }

    #[test]
    fn test_file_message_type_follows_mime() {
        let market = fixtures::Marketplace::two_party();
        let image = fixtures::file_message(
            &market.job,
            market.client.user_id,
            market.freelancer.user_id,
            "image/png",
            10,
            fixtures::base_time(),
        );
        assert_eq!(image.message_type, MessageType::Image);
        assert!(image.has_attachment());
    }

    proptest! {
        #[test]
        fn prop_generated_messages_stay_in_job(
            message in generators::arb_message_in(fixtures::Marketplace::two_party().job)
        ) {
            prop_assert!(message.sender_id != message.receiver_id);
        }

        #[test]
        fn prop_generated_pagination_is_valid(page in generators::arb_pagination()) {
            prop_assert!(page.page() >= 1);
            prop_assert!((1..=100).contains(&page.limit()));
        }
    }
}
