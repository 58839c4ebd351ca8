//! Time-windowed analytics reports.
//!
//! Each report resolves its window against the injected [`Clock`] at
//! computation time, issues grouped counts against the store and is
//! memoized under `analytics:<report>:<window>`. The platform report runs
//! the four sub-reports concurrently and adds a job status breakdown.
//!
//! All reports are admin only.

use gigbridge_core::{
    AnalyticsWindow, Clock, DateRange, GigResult, Principal, StoreError, Timestamp,
};
use gigbridge_storage::{
    Aggregation, Bucket, CacheAside, Cached, KeyNamespace, MarketplaceStore, MessageFacet,
    NotificationFacet, ReportKind, StoreResult, UserFacet, UserQuery, READ, UNREAD, VERIFIED,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::memo::memoize;
use crate::search::require_admin;

/// Entries kept in every "top N" list.
pub const TOP_N: usize = 10;

/// A labelled count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CountEntry {
    pub key: String,
    pub count: u64,
}

/// A labelled count of files with their combined size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub key: String,
    pub count: u64,
    pub total_bytes: u64,
}

/// Messages sent during one UTC hour of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct HourCount {
    pub hour: u32,
    pub count: u64,
}

/// The instants a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub time_range: AnalyticsWindow,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub start_date: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub end_date: Timestamp,
}

impl ReportPeriod {
    fn resolve(window: AnalyticsWindow, clock: &dyn Clock) -> Self {
        let (start_date, end_date) = window.bounds(clock);
        Self {
            time_range: window,
            start_date,
            end_date,
        }
    }

    fn range(&self) -> DateRange {
        DateRange::new(Some(self.start_date), Some(self.end_date))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MessageReport {
    pub period: ReportPeriod,
    pub total_messages: u64,
    pub by_type: Vec<CountEntry>,
    /// All 24 hours, zero-filled.
    pub by_hour: Vec<HourCount>,
    pub top_senders: Vec<CountEntry>,
    pub read_messages: u64,
    pub unread_messages: u64,
    pub average_per_day: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub period: ReportPeriod,
    pub total_files: u64,
    pub total_bytes: u64,
    pub by_message_type: Vec<FileEntry>,
    pub by_mime_type: Vec<FileEntry>,
    pub top_uploaders: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UserReport {
    pub period: ReportPeriod,
    pub new_users: u64,
    pub new_users_by_role: Vec<CountEntry>,
    /// Verified users whose record changed inside the window.
    pub newly_verified: u64,
    /// Distinct senders inside the window.
    pub active_users: u64,
    pub total_users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NotificationReport {
    pub period: ReportPeriod,
    pub total_notifications: u64,
    pub by_kind: Vec<CountEntry>,
    pub read_notifications: u64,
    pub unread_notifications: u64,
    /// `read / total`, 0 when nothing was sent.
    pub read_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PlatformReport {
    pub period: ReportPeriod,
    pub messages: MessageReport,
    pub files: FileReport,
    pub users: UserReport,
    pub notifications: NotificationReport,
    /// Jobs created inside the window, by status.
    pub job_status: Vec<CountEntry>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub generated_at: Timestamp,
}

fn counts(buckets: Vec<Bucket>) -> Vec<CountEntry> {
    buckets
        .into_iter()
        .map(|b| CountEntry {
            key: b.key,
            count: b.count,
        })
        .collect()
}

fn files(buckets: Vec<Bucket>) -> Vec<FileEntry> {
    buckets
        .into_iter()
        .map(|b| FileEntry {
            key: b.key,
            count: b.count,
            total_bytes: b.total_bytes,
        })
        .collect()
}

fn count_of(buckets: &[Bucket], key: &str) -> u64 {
    buckets
        .iter()
        .find(|b| b.key == key)
        .map_or(0, |b| b.count)
}

/// Spread hour-of-day buckets over all 24 hours.
pub(crate) fn fill_hours(buckets: &[Bucket]) -> Vec<HourCount> {
    let mut hours: Vec<HourCount> = (0..24).map(|hour| HourCount { hour, count: 0 }).collect();
    for bucket in buckets {
        if let Ok(hour) = bucket.key.parse::<usize>() {
            if let Some(slot) = hours.get_mut(hour) {
                slot.count += bucket.count;
            }
        }
    }
    hours
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Report computations, free of caching.
#[derive(Clone)]
struct Reports {
    store: Arc<dyn MarketplaceStore>,
    clock: Arc<dyn Clock>,
}

impl Reports {
    async fn messages(&self, window: AnalyticsWindow) -> StoreResult<MessageReport> {
        let period = ReportPeriod::resolve(window, self.clock.as_ref());
        self.messages_in(period).await
    }

    async fn messages_in(&self, period: ReportPeriod) -> StoreResult<MessageReport> {
        let range = period.range();
        let by = |by| Aggregation::Messages {
            by,
            range,
            attachments_only: false,
        };
        let (by_type, by_hour, senders, read_state) = tokio::try_join!(
            self.store.aggregate(by(MessageFacet::MessageType)),
            self.store.aggregate(by(MessageFacet::HourOfDay)),
            self.store.aggregate(by(MessageFacet::Sender)),
            self.store.aggregate(by(MessageFacet::ReadState)),
        )?;

        let total_messages: u64 = by_type.iter().map(|b| b.count).sum();
        let mut top_senders = senders;
        top_senders.truncate(TOP_N);
        Ok(MessageReport {
            period,
            total_messages,
            by_hour: fill_hours(&by_hour),
            read_messages: count_of(&read_state, READ),
            unread_messages: count_of(&read_state, UNREAD),
            by_type: counts(by_type),
            top_senders: counts(top_senders),
            average_per_day: total_messages as f64 / period.time_range.days() as f64,
        })
    }

    async fn files(&self, window: AnalyticsWindow) -> StoreResult<FileReport> {
        let period = ReportPeriod::resolve(window, self.clock.as_ref());
        self.files_in(period).await
    }

    async fn files_in(&self, period: ReportPeriod) -> StoreResult<FileReport> {
        let range = period.range();
        let by = |by| Aggregation::Messages {
            by,
            range,
            attachments_only: true,
        };
        let (by_message_type, by_mime_type, uploaders) = tokio::try_join!(
            self.store.aggregate(by(MessageFacet::MessageType)),
            self.store.aggregate(by(MessageFacet::MimeType)),
            self.store.aggregate(by(MessageFacet::Sender)),
        )?;

        let mut top_uploaders = uploaders;
        top_uploaders.truncate(TOP_N);
        Ok(FileReport {
            period,
            total_files: by_message_type.iter().map(|b| b.count).sum(),
            total_bytes: by_message_type.iter().map(|b| b.total_bytes).sum(),
            by_message_type: files(by_message_type),
            by_mime_type: files(by_mime_type),
            top_uploaders: files(top_uploaders),
        })
    }

    async fn users(&self, window: AnalyticsWindow) -> StoreResult<UserReport> {
        let period = ReportPeriod::resolve(window, self.clock.as_ref());
        self.users_in(period).await
    }

    async fn users_in(&self, period: ReportPeriod) -> StoreResult<UserReport> {
        let range = period.range();
        let all_users = UserQuery::default();
        let (by_role, verification, senders, total_users) = tokio::try_join!(
            self.store.aggregate(Aggregation::Users {
                by: UserFacet::Role,
                range,
            }),
            self.store.aggregate(Aggregation::Users {
                by: UserFacet::Verification,
                range,
            }),
            self.store.aggregate(Aggregation::Messages {
                by: MessageFacet::Sender,
                range,
                attachments_only: false,
            }),
            self.store.user_count(&all_users),
        )?;

        Ok(UserReport {
            period,
            new_users: by_role.iter().map(|b| b.count).sum(),
            new_users_by_role: counts(by_role),
            newly_verified: count_of(&verification, VERIFIED),
            active_users: senders.len() as u64,
            total_users,
        })
    }

    async fn notifications(&self, window: AnalyticsWindow) -> StoreResult<NotificationReport> {
        let period = ReportPeriod::resolve(window, self.clock.as_ref());
        self.notifications_in(period).await
    }

    async fn notifications_in(&self, period: ReportPeriod) -> StoreResult<NotificationReport> {
        let range = period.range();
        let (by_kind, read_state) = tokio::try_join!(
            self.store.aggregate(Aggregation::Notifications {
                by: NotificationFacet::Kind,
                range,
            }),
            self.store.aggregate(Aggregation::Notifications {
                by: NotificationFacet::ReadState,
                range,
            }),
        )?;

        let total_notifications: u64 = by_kind.iter().map(|b| b.count).sum();
        let read_notifications = count_of(&read_state, READ);
        Ok(NotificationReport {
            period,
            total_notifications,
            by_kind: counts(by_kind),
            read_notifications,
            unread_notifications: count_of(&read_state, UNREAD),
            read_rate: ratio(read_notifications, total_notifications),
        })
    }

    /// All sub-reports share one resolved period.
    async fn platform(&self, window: AnalyticsWindow) -> StoreResult<PlatformReport> {
        let period = ReportPeriod::resolve(window, self.clock.as_ref());
        let (messages, files, users, notifications, job_status) = tokio::try_join!(
            self.messages_in(period),
            self.files_in(period),
            self.users_in(period),
            self.notifications_in(period),
            self.store.aggregate(Aggregation::JobStatus {
                range: period.range(),
            }),
        )?;

        Ok(PlatformReport {
            period,
            messages,
            files,
            users,
            notifications,
            job_status: counts(job_status),
            generated_at: self.clock.now(),
        })
    }
}

/// Memoized analytics over a [`MarketplaceStore`].
#[derive(Clone)]
pub struct AnalyticsAggregator {
    reports: Reports,
    cache: CacheAside,
    ttl: Duration,
}

impl AnalyticsAggregator {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        cache: CacheAside,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            reports: Reports { store, clock },
            cache,
            ttl,
        }
    }

    async fn memoized<T, F, Fut>(
        &self,
        principal: &Principal,
        report: ReportKind,
        window: AnalyticsWindow,
        compute: F,
    ) -> GigResult<Cached<T>>
    where
        T: Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(Reports) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        require_admin(principal, "read analytics")?;

        let reports = self.reports.clone();
        let key = Ok(KeyNamespace::analytics(report, window));
        let result = memoize(&self.cache, key, self.ttl, move || compute(reports.clone())).await?;
        debug!(
            report = report.as_str(),
            window = window.as_str(),
            from_cache = result.from_cache(),
            "Analytics report"
        );
        Ok(result)
    }

    pub async fn messages(
        &self,
        principal: &Principal,
        window: AnalyticsWindow,
    ) -> GigResult<Cached<MessageReport>> {
        self.memoized(principal, ReportKind::Messages, window, move |r| async move {
            r.messages(window).await
        })
        .await
    }

    pub async fn files(
        &self,
        principal: &Principal,
        window: AnalyticsWindow,
    ) -> GigResult<Cached<FileReport>> {
        self.memoized(principal, ReportKind::Files, window, move |r| async move {
            r.files(window).await
        })
        .await
    }

    pub async fn users(
        &self,
        principal: &Principal,
        window: AnalyticsWindow,
    ) -> GigResult<Cached<UserReport>> {
        self.memoized(principal, ReportKind::Users, window, move |r| async move {
            r.users(window).await
        })
        .await
    }

    pub async fn notifications(
        &self,
        principal: &Principal,
        window: AnalyticsWindow,
    ) -> GigResult<Cached<NotificationReport>> {
        self.memoized(principal, ReportKind::Notifications, window, move |r| async move {
            r.notifications(window).await
        })
        .await
    }

    pub async fn platform(
        &self,
        principal: &Principal,
        window: AnalyticsWindow,
    ) -> GigResult<Cached<PlatformReport>> {
        self.memoized(principal, ReportKind::Platform, window, move |r| async move {
            r.platform(window).await
        })
        .await
    }
}
