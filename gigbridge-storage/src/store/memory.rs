//! In-process marketplace store.
//!
//! Evaluates every [`MarketplaceStore`] query by scanning. Fine for tests,
//! demos and small fixtures; the Postgres store is the production path.

use async_trait::async_trait;
use chrono::Timelike;
use gigbridge_core::{
    contains_ignore_case, Job, JobId, JobSortField, JobStatus, Message, MessageId,
    MessageSortField, Notification, NotificationId, Pagination, StoreError, User, UserId,
    UserSortField,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    sort_buckets, Aggregation, Bucket, ConversationRollup, ConversationScope, JobQuery, JobSort,
    MarketplaceStore, MessageFacet, MessageQuery, MessageSort, NotificationFacet, StoreResult,
    UserFacet, UserQuery, UserSort, READ, UNREAD, UNVERIFIED, VERIFIED,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    jobs: HashMap<JobId, Job>,
    messages: HashMap<MessageId, Message>,
    notifications: HashMap<NotificationId, Notification>,
}

/// Marketplace store held in process memory.
#[derive(Debug)]
pub struct InMemoryMarketplaceStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
    queries: AtomicU64,
}

impl Default for InMemoryMarketplaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMarketplaceStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
            queries: AtomicU64::new(0),
        }
    }

    /// Toggle simulated availability; while down every call fails with
    /// `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of read queries served. Writes are not counted.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    /// Seed without going through the async contract.
    pub fn insert_users(&self, users: impl IntoIterator<Item = User>) -> StoreResult<()> {
        let mut tables = self.write()?;
        for user in users {
            tables.users.insert(user.user_id, user);
        }
        Ok(())
    }

    pub fn insert_jobs(&self, jobs: impl IntoIterator<Item = Job>) -> StoreResult<()> {
        let mut tables = self.write()?;
        for job in jobs {
            tables.jobs.insert(job.job_id, job);
        }
        Ok(())
    }

    pub fn insert_messages(&self, messages: impl IntoIterator<Item = Message>) -> StoreResult<()> {
        let mut tables = self.write()?;
        for message in messages {
            tables.messages.insert(message.message_id, message);
        }
        Ok(())
    }

    pub fn insert_notifications(
        &self,
        notifications: impl IntoIterator<Item = Notification>,
    ) -> StoreResult<()> {
        let mut tables = self.write()?;
        for notification in notifications {
            tables
                .notifications
                .insert(notification.notification_id, notification);
        }
        Ok(())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                reason: "in-memory store marked unavailable".to_string(),
            })
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.check_available()?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.tables.read().map_err(|_| StoreError::Unavailable {
            reason: "store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.check_available()?;
        self.tables.write().map_err(|_| StoreError::Unavailable {
            reason: "store lock poisoned".to_string(),
        })
    }
}

fn message_matches(message: &Message, query: &MessageQuery) -> bool {
    if let Some(scope) = &query.job_scope {
        if !scope.contains(&message.job_id) {
            return false;
        }
    }
    query.job_id.map_or(true, |id| message.job_id == id)
        && query.sender_id.map_or(true, |id| message.sender_id == id)
        && query.receiver_id.map_or(true, |id| message.receiver_id == id)
        && query
            .message_type
            .map_or(true, |t| message.message_type == t)
        && query
            .has_attachment
            .map_or(true, |want| message.has_attachment() == want)
        && query
            .text
            .as_deref()
            .map_or(true, |text| contains_ignore_case(&message.message, text))
        && query.created.contains(message.created_at)
        && query.is_read.map_or(true, |read| message.is_read == read)
}

fn user_matches(user: &User, query: &UserQuery) -> bool {
    let text_ok = query.text.as_deref().map_or(true, |text| {
        contains_ignore_case(&user.phone, text)
            || user
                .email
                .as_deref()
                .is_some_and(|email| contains_ignore_case(email, text))
            || user
                .display_name
                .as_deref()
                .is_some_and(|name| contains_ignore_case(name, text))
    });
    text_ok
        && query.role.map_or(true, |role| user.role == role)
        && query
            .is_verified
            .map_or(true, |verified| user.is_verified == verified)
        && query.created.contains(user.created_at)
}

fn job_matches(job: &Job, query: &JobQuery) -> bool {
    query.participant.map_or(true, |user| job.is_participant(user))
        && query.client_id.map_or(true, |id| job.client_id == id)
        && query
            .freelancer_id
            .map_or(true, |id| job.freelancer_id == Some(id))
        && query.status.map_or(true, |status| job.status == status)
        && query
            .text
            .as_deref()
            .map_or(true, |text| contains_ignore_case(&job.title, text))
        && query.created.contains(job.created_at)
}

// Ties fall back to id order so pages are stable.
fn sort_messages(messages: &mut [Message], sort: MessageSort) {
    messages.sort_by(|a, b| {
        let ordering = match sort.field {
            MessageSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            MessageSortField::Message => a.message.cmp(&b.message),
            MessageSortField::SenderId => a.sender_id.cmp(&b.sender_id),
        };
        sort.direction
            .apply(ordering.then_with(|| a.message_id.cmp(&b.message_id)))
    });
}

fn sort_users(users: &mut [User], sort: UserSort) {
    users.sort_by(|a, b| {
        let ordering = match sort.field {
            UserSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            UserSortField::Phone => a.phone.cmp(&b.phone),
            UserSortField::Role => a.role.as_str().cmp(b.role.as_str()),
        };
        sort.direction
            .apply(ordering.then_with(|| a.user_id.cmp(&b.user_id)))
    });
}

fn sort_jobs(jobs: &mut [Job], sort: JobSort) {
    jobs.sort_by(|a, b| {
        let ordering = match sort.field {
            JobSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            JobSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            JobSortField::Title => a.title.cmp(&b.title),
        };
        sort.direction
            .apply(ordering.then_with(|| a.job_id.cmp(&b.job_id)))
    });
}

/// Accumulates `(count, bytes)` per key, then emits ordered buckets.
#[derive(Default)]
struct Grouper {
    groups: HashMap<String, (u64, u64)>,
}

impl Grouper {
    fn add(&mut self, key: impl Into<String>, bytes: u64) {
        let entry = self.groups.entry(key.into()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += bytes;
    }

    fn finish(self) -> Vec<Bucket> {
        let mut buckets: Vec<Bucket> = self
            .groups
            .into_iter()
            .map(|(key, (count, bytes))| Bucket::new(key, count, bytes))
            .collect();
        sort_buckets(&mut buckets);
        buckets
    }
}

fn read_state(is_read: bool) -> &'static str {
    if is_read {
        READ
    } else {
        UNREAD
    }
}

fn aggregate_tables(tables: &Tables, aggregation: Aggregation) -> Vec<Bucket> {
    let mut grouper = Grouper::default();
    match aggregation {
        Aggregation::Messages {
            by,
            range,
            attachments_only,
        } => {
            let messages = tables
                .messages
                .values()
                .filter(|m| range.contains(m.created_at))
                .filter(|m| !attachments_only || m.has_attachment());
            for message in messages {
                let bytes = message.attachment.as_ref().map_or(0, |a| a.size_bytes);
                let key = match by {
                    MessageFacet::MessageType => message.message_type.as_str().to_string(),
                    MessageFacet::HourOfDay => message.created_at.hour().to_string(),
                    MessageFacet::Sender => message.sender_id.to_string(),
                    MessageFacet::MimeType => match &message.attachment {
                        Some(attachment) => attachment.mime_type.clone(),
                        None => continue,
                    },
                    MessageFacet::ReadState => read_state(message.is_read).to_string(),
                };
                grouper.add(key, bytes);
            }
        }
        Aggregation::Users { by, range } => {
            for user in tables.users.values() {
                match by {
                    UserFacet::Role if range.contains(user.created_at) => {
                        grouper.add(user.role.as_str(), 0);
                    }
                    UserFacet::Verification if range.contains(user.updated_at) => {
                        let key = if user.is_verified { VERIFIED } else { UNVERIFIED };
                        grouper.add(key, 0);
                    }
                    _ => {}
                }
            }
        }
        Aggregation::Notifications { by, range } => {
            let notifications = tables
                .notifications
                .values()
                .filter(|n| range.contains(n.created_at));
            for notification in notifications {
                let key = match by {
                    NotificationFacet::Kind => notification.kind.as_str(),
                    NotificationFacet::ReadState => read_state(notification.is_read),
                };
                grouper.add(key, 0);
            }
        }
        Aggregation::JobStatus { range } => {
            for job in tables.jobs.values().filter(|j| range.contains(j.created_at)) {
                grouper.add(job.status.as_str(), 0);
            }
        }
    }
    grouper.finish()
}

#[async_trait]
impl MarketplaceStore for InMemoryMarketplaceStore {
    async fn user_get(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn job_get(&self, id: JobId) -> StoreResult<Option<Job>> {
        Ok(self.read()?.jobs.get(&id).cloned())
    }

    async fn jobs_for_participant(
        &self,
        user: UserId,
        status: Option<JobStatus>,
    ) -> StoreResult<Vec<Job>> {
        let tables = self.read()?;
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|job| job.is_participant(user))
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.job_id);
        Ok(jobs)
    }

    async fn job_find(
        &self,
        query: &JobQuery,
        sort: JobSort,
        page: Pagination,
    ) -> StoreResult<Vec<Job>> {
        let tables = self.read()?;
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|job| job_matches(job, query))
            .cloned()
            .collect();
        sort_jobs(&mut jobs, sort);
        Ok(page.slice(jobs))
    }

    async fn job_count(&self, query: &JobQuery) -> StoreResult<u64> {
        let tables = self.read()?;
        Ok(tables.jobs.values().filter(|j| job_matches(j, query)).count() as u64)
    }

    async fn message_find(
        &self,
        query: &MessageQuery,
        sort: MessageSort,
        page: Pagination,
    ) -> StoreResult<Vec<Message>> {
        let tables = self.read()?;
        let mut messages: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| message_matches(m, query))
            .cloned()
            .collect();
        sort_messages(&mut messages, sort);
        Ok(page.slice(messages))
    }

    async fn message_count(&self, query: &MessageQuery) -> StoreResult<u64> {
        let tables = self.read()?;
        Ok(tables
            .messages
            .values()
            .filter(|m| message_matches(m, query))
            .count() as u64)
    }

    async fn user_find(
        &self,
        query: &UserQuery,
        sort: UserSort,
        page: Pagination,
    ) -> StoreResult<Vec<User>> {
        let tables = self.read()?;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| user_matches(u, query))
            .cloned()
            .collect();
        sort_users(&mut users, sort);
        Ok(page.slice(users))
    }

    async fn user_count(&self, query: &UserQuery) -> StoreResult<u64> {
        let tables = self.read()?;
        Ok(tables.users.values().filter(|u| user_matches(u, query)).count() as u64)
    }

    async fn conversation_rollup(
        &self,
        scope: ConversationScope,
    ) -> StoreResult<Vec<ConversationRollup>> {
        let tables = self.read()?;
        let mut rollups: HashMap<JobId, ConversationRollup> = HashMap::new();

        let in_scope = |job_id: &JobId| {
            tables.jobs.get(job_id).is_some_and(|job| {
                job.is_participant(scope.participant)
                    && scope.job_status.map_or(true, |s| job.status == s)
            })
        };

        for message in tables.messages.values().filter(|m| in_scope(&m.job_id)) {
            let unread = u64::from(message.is_unread_for(scope.participant));
            rollups
                .entry(message.job_id)
                .and_modify(|rollup| {
                    rollup.message_count += 1;
                    rollup.unread_count += unread;
                    let newer = (message.created_at, message.message_id)
                        > (rollup.last_message.created_at, rollup.last_message.message_id);
                    if newer {
                        rollup.last_message = message.clone();
                    }
                })
                .or_insert_with(|| ConversationRollup {
                    job_id: message.job_id,
                    last_message: message.clone(),
                    message_count: 1,
                    unread_count: unread,
                });
        }

        let mut rollups: Vec<ConversationRollup> = rollups.into_values().collect();
        rollups.sort_by_key(|rollup| rollup.job_id);
        Ok(rollups)
    }

    async fn aggregate(&self, aggregation: Aggregation) -> StoreResult<Vec<Bucket>> {
        let tables = self.read()?;
        Ok(aggregate_tables(&tables, aggregation))
    }

    async fn user_upsert(&self, user: &User) -> StoreResult<()> {
        self.write()?.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn job_upsert(&self, job: &Job) -> StoreResult<()> {
        self.write()?.jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn message_insert(&self, message: &Message) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.messages.contains_key(&message.message_id) {
            return Err(StoreError::Query {
                reason: format!("duplicate message id {}", message.message_id),
            });
        }
        tables.messages.insert(message.message_id, message.clone());
        Ok(())
    }

    async fn messages_mark_read(&self, job: JobId, reader: UserId) -> StoreResult<Vec<MessageId>> {
        let mut tables = self.write()?;
        let mut changed: Vec<MessageId> = tables
            .messages
            .values_mut()
            .filter(|m| m.job_id == job && m.is_unread_for(reader))
            .map(|m| {
                m.is_read = true;
                m.message_id
            })
            .collect();
        changed.sort();
        Ok(changed)
    }

    async fn notification_insert(&self, notification: &Notification) -> StoreResult<()> {
        self.write()?
            .notifications
            .insert(notification.notification_id, notification.clone());
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }
}
