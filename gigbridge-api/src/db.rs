//! PostgreSQL Marketplace Store
//!
//! Connection pooling with deadpool-postgres and a [`MarketplaceStore`]
//! implementation that translates each store query into one SQL statement.
//! Predicates are assembled with positional parameters only; sort columns
//! come from a closed mapping, never from request text.
//!
//! The schema lives in `sql/schema.sql`.

use crate::error::{ApiError, ApiResult};
use crate::telemetry::METRICS;
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use gigbridge_core::{
    Attachment, DateRange, EntityIdType, Job, JobId, JobSortField, JobStatus, Message, MessageId,
    MessageSortField, Notification, Pagination, SortDirection, StoreError, User, UserId,
    UserSortField,
};
use gigbridge_storage::{
    sort_buckets, Aggregation, Bucket, ConversationRollup, ConversationScope, JobQuery, JobSort,
    MarketplaceStore, MessageFacet, MessageQuery, MessageSort, NotificationFacet, StoreResult,
    UserFacet, UserQuery, UserSort,
};
use std::fmt::Display;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio_postgres::types::{FromSql, ToSql};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

/// Schema applied by [`PgMarketplaceStore::apply_schema`].
pub const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
    /// How long to wait for a pooled connection.
    pub timeout: Duration,
    /// Run `sql/schema.sql` at startup.
    pub apply_schema: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "gigbridge".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
            apply_schema: false,
        }
    }
}

impl DbConfig {
    /// Load from `GIGBRIDGE_DB_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("GIGBRIDGE_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("GIGBRIDGE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("GIGBRIDGE_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("GIGBRIDGE_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("GIGBRIDGE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("GIGBRIDGE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("GIGBRIDGE_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            apply_schema: std::env::var("GIGBRIDGE_DB_APPLY_SCHEMA")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
        }
    }

    /// Create a connection pool from this configuration. No connection is
    /// opened until the first query.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// QUERY BUILDING
// ============================================================================

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// `AND`-joined predicates with their positional parameters.
#[derive(Default)]
struct Predicates {
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl Predicates {
    /// Register a parameter and return its placeholder.
    fn bind(&mut self, value: impl ToSql + Sync + Send + 'static) -> String {
        self.params.push(Box::new(value));
        format!("${}", self.params.len())
    }

    fn raw(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    fn eq(&mut self, column: &str, value: impl ToSql + Sync + Send + 'static) {
        let p = self.bind(value);
        self.clauses.push(format!("{column} = {p}"));
    }

    /// Case-insensitive substring match against any of `columns`.
    fn contains_text(&mut self, columns: &[&str], text: &str) {
        let p = self.bind(like_pattern(text));
        let any: Vec<String> = columns.iter().map(|c| format!("{c} ILIKE {p}")).collect();
        self.clauses.push(format!("({})", any.join(" OR ")));
    }

    /// Inclusive on both ends.
    fn range(&mut self, column: &str, range: DateRange) {
        if let Some(from) = range.from {
            let p = self.bind(from);
            self.clauses.push(format!("{column} >= {p}"));
        }
        if let Some(to) = range.to {
            let p = self.bind(to);
            self.clauses.push(format!("{column} <= {p}"));
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Append `LIMIT`/`OFFSET` placeholders for `page`.
    fn page_sql(&mut self, page: Pagination) -> String {
        let limit = self.bind(i64::from(page.limit()));
        let offset = self.bind(page.offset() as i64);
        format!(" LIMIT {limit} OFFSET {offset}")
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

/// `%text%` with LIKE metacharacters escaped.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn direction_sql(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

// Text columns sort by byte order so results match the in-memory store.
fn message_order(sort: MessageSort) -> String {
    let column = match sort.field {
        MessageSortField::CreatedAt => "created_at",
        MessageSortField::Message => "message COLLATE \"C\"",
        MessageSortField::SenderId => "sender_id",
    };
    let dir = direction_sql(sort.direction);
    format!(" ORDER BY {column} {dir}, message_id {dir}")
}

fn user_order(sort: UserSort) -> String {
    let column = match sort.field {
        UserSortField::CreatedAt => "created_at",
        UserSortField::Phone => "phone COLLATE \"C\"",
        UserSortField::Role => "role COLLATE \"C\"",
    };
    let dir = direction_sql(sort.direction);
    format!(" ORDER BY {column} {dir}, user_id {dir}")
}

fn job_order(sort: JobSort) -> String {
    let column = match sort.field {
        JobSortField::CreatedAt => "created_at",
        JobSortField::UpdatedAt => "updated_at",
        JobSortField::Title => "title COLLATE \"C\"",
    };
    let dir = direction_sql(sort.direction);
    format!(" ORDER BY {column} {dir}, job_id {dir}")
}

fn message_predicates(query: &MessageQuery) -> Predicates {
    let mut p = Predicates::default();
    if let Some(scope) = &query.job_scope {
        let ids: Vec<Uuid> = scope.iter().map(|id| id.as_uuid()).collect();
        let placeholder = p.bind(ids);
        p.raw(format!("job_id = ANY({placeholder})"));
    }
    if let Some(id) = query.job_id {
        p.eq("job_id", id.as_uuid());
    }
    if let Some(id) = query.sender_id {
        p.eq("sender_id", id.as_uuid());
    }
    if let Some(id) = query.receiver_id {
        p.eq("receiver_id", id.as_uuid());
    }
    if let Some(message_type) = query.message_type {
        p.eq("message_type", message_type.as_str().to_string());
    }
    match query.has_attachment {
        Some(true) => p.raw("attachment_url IS NOT NULL"),
        Some(false) => p.raw("attachment_url IS NULL"),
        None => {}
    }
    if let Some(text) = &query.text {
        p.contains_text(&["message"], text);
    }
    p.range("created_at", query.created);
    if let Some(is_read) = query.is_read {
        p.eq("is_read", is_read);
    }
    p
}

fn user_predicates(query: &UserQuery) -> Predicates {
    let mut p = Predicates::default();
    if let Some(text) = &query.text {
        p.contains_text(&["phone", "email", "display_name"], text);
    }
    if let Some(role) = query.role {
        p.eq("role", role.as_str().to_string());
    }
    if let Some(is_verified) = query.is_verified {
        p.eq("is_verified", is_verified);
    }
    p.range("created_at", query.created);
    p
}

fn job_predicates(query: &JobQuery) -> Predicates {
    let mut p = Predicates::default();
    if let Some(user) = query.participant {
        let placeholder = p.bind(user.as_uuid());
        p.raw(format!(
            "(client_id = {placeholder} OR freelancer_id = {placeholder})"
        ));
    }
    if let Some(id) = query.client_id {
        p.eq("client_id", id.as_uuid());
    }
    if let Some(id) = query.freelancer_id {
        p.eq("freelancer_id", id.as_uuid());
    }
    if let Some(status) = query.status {
        p.eq("status", status.as_str().to_string());
    }
    if let Some(text) = &query.text {
        p.contains_text(&["title"], text);
    }
    p.range("created_at", query.created);
    p
}

const READ_STATE_SQL: &str = "CASE WHEN is_read THEN 'read' ELSE 'unread' END";

/// `(table, key expression, extra predicate, range column)` for a grouping.
fn aggregation_plan(
    aggregation: Aggregation,
) -> (&'static str, &'static str, Option<&'static str>, DateRange) {
    match aggregation {
        Aggregation::Messages {
            by,
            range,
            attachments_only,
        } => {
            let (key, extra) = match by {
                MessageFacet::MessageType => ("message_type", None),
                MessageFacet::HourOfDay => (
                    "EXTRACT(HOUR FROM created_at AT TIME ZONE 'UTC')::INT::TEXT",
                    None,
                ),
                MessageFacet::Sender => ("sender_id::TEXT", None),
                MessageFacet::MimeType => {
                    ("attachment_mime_type", Some("attachment_url IS NOT NULL"))
                }
                MessageFacet::ReadState => (READ_STATE_SQL, None),
            };
            let extra = if attachments_only {
                Some("attachment_url IS NOT NULL")
            } else {
                extra
            };
            ("messages", key, extra, range)
        }
        Aggregation::Users { by, range } => match by {
            UserFacet::Role => ("users", "role", None, range),
            UserFacet::Verification => (
                "users",
                "CASE WHEN is_verified THEN 'verified' ELSE 'unverified' END",
                None,
                range,
            ),
        },
        Aggregation::Notifications { by, range } => match by {
            NotificationFacet::Kind => ("notifications", "kind", None, range),
            NotificationFacet::ReadState => ("notifications", READ_STATE_SQL, None, range),
        },
        Aggregation::JobStatus { range } => ("jobs", "status", None, range),
    }
}

fn aggregation_range_column(aggregation: Aggregation) -> &'static str {
    match aggregation {
        Aggregation::Users {
            by: UserFacet::Verification,
            ..
        } => "updated_at",
        _ => "created_at",
    }
}

// ============================================================================
// ROW DECODING
// ============================================================================

const USER_COLUMNS: &str =
    "user_id, phone, email, display_name, role, is_verified, created_at, updated_at";
const JOB_COLUMNS: &str =
    "job_id, title, description, status, client_id, freelancer_id, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "message_id, job_id, sender_id, receiver_id, message, message_type, \
     attachment_url, attachment_file_name, attachment_mime_type, attachment_size_bytes, \
     is_read, created_at";

fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str, entity: &str) -> StoreResult<T> {
    row.try_get(name).map_err(|e| StoreError::Decode {
        entity: entity.to_string(),
        reason: format!("column {name}: {e}"),
    })
}

fn parse_wire<T>(raw: &str, entity: &str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| StoreError::Decode {
        entity: entity.to_string(),
        reason: e.to_string(),
    })
}

fn count_of(row: &Row, name: &str, entity: &str) -> StoreResult<u64> {
    let n: i64 = column(row, name, entity)?;
    Ok(n.max(0) as u64)
}

fn user_from_row(row: &Row) -> StoreResult<User> {
    const E: &str = "user";
    let role: String = column(row, "role", E)?;
    Ok(User {
        user_id: UserId::from_uuid(column(row, "user_id", E)?),
        phone: column(row, "phone", E)?,
        email: column(row, "email", E)?,
        display_name: column(row, "display_name", E)?,
        role: parse_wire(&role, E)?,
        is_verified: column(row, "is_verified", E)?,
        created_at: column(row, "created_at", E)?,
        updated_at: column(row, "updated_at", E)?,
    })
}

fn job_from_row(row: &Row) -> StoreResult<Job> {
    const E: &str = "job";
    let status: String = column(row, "status", E)?;
    let freelancer: Option<Uuid> = column(row, "freelancer_id", E)?;
    Ok(Job {
        job_id: JobId::from_uuid(column(row, "job_id", E)?),
        title: column(row, "title", E)?,
        description: column(row, "description", E)?,
        status: parse_wire(&status, E)?,
        client_id: UserId::from_uuid(column(row, "client_id", E)?),
        freelancer_id: freelancer.map(UserId::from_uuid),
        created_at: column(row, "created_at", E)?,
        updated_at: column(row, "updated_at", E)?,
    })
}

fn message_from_row(row: &Row) -> StoreResult<Message> {
    const E: &str = "message";
    let message_type: String = column(row, "message_type", E)?;
    let url: Option<String> = column(row, "attachment_url", E)?;
    let attachment = match url {
        Some(url) => {
            let size: Option<i64> = column(row, "attachment_size_bytes", E)?;
            Some(Attachment {
                url,
                file_name: column::<Option<String>>(row, "attachment_file_name", E)?
                    .unwrap_or_default(),
                mime_type: column::<Option<String>>(row, "attachment_mime_type", E)?
                    .unwrap_or_default(),
                size_bytes: size.unwrap_or(0).max(0) as u64,
            })
        }
        None => None,
    };
    Ok(Message {
        message_id: MessageId::from_uuid(column(row, "message_id", E)?),
        job_id: JobId::from_uuid(column(row, "job_id", E)?),
        sender_id: UserId::from_uuid(column(row, "sender_id", E)?),
        receiver_id: UserId::from_uuid(column(row, "receiver_id", E)?),
        message: column(row, "message", E)?,
        message_type: parse_wire(&message_type, E)?,
        attachment,
        is_read: column(row, "is_read", E)?,
        created_at: column(row, "created_at", E)?,
    })
}

// ============================================================================
// STORE
// ============================================================================

fn pool_error(err: deadpool_postgres::PoolError) -> StoreError {
    tracing::error!("Connection pool error: {:?}", err);
    StoreError::Unavailable {
        reason: format!("connection pool: {err}"),
    }
}

fn query_error(err: tokio_postgres::Error) -> StoreError {
    tracing::error!("Database error: {:?}", err);
    if err.is_closed() {
        StoreError::Unavailable {
            reason: "database connection closed".to_string(),
        }
    } else {
        StoreError::Query {
            reason: err.to_string(),
        }
    }
}

/// [`MarketplaceStore`] over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgMarketplaceStore {
    pool: Pool,
}

impl PgMarketplaceStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create tables and indexes if they do not exist.
    pub async fn apply_schema(&self) -> StoreResult<()> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(query_error)
    }

    async fn rows(
        &self,
        operation: &'static str,
        entity: &'static str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StoreResult<Vec<Row>> {
        let start = Instant::now();
        let result = async {
            let conn = self.pool.get().await.map_err(pool_error)?;
            conn.query(sql, params).await.map_err(query_error)
        }
        .await;
        record(operation, entity, result.is_ok(), start);
        result
    }

    async fn execute(
        &self,
        operation: &'static str,
        entity: &'static str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StoreResult<u64> {
        let start = Instant::now();
        let result = async {
            let conn = self.pool.get().await.map_err(pool_error)?;
            conn.execute(sql, params).await.map_err(query_error)
        }
        .await;
        record(operation, entity, result.is_ok(), start);
        result
    }

    async fn count(&self, entity: &'static str, table: &str, p: &Predicates) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {table}{}", p.where_sql());
        let rows = self.rows("count", entity, &sql, &p.params()).await?;
        match rows.first() {
            Some(row) => count_of(row, "n", entity),
            None => Ok(0),
        }
    }
}

fn record(operation: &str, entity: &str, success: bool, start: Instant) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_db_operation(operation, entity, success, start.elapsed().as_secs_f64());
    }
}

#[async_trait]
impl MarketplaceStore for PgMarketplaceStore {
    async fn user_get(&self, id: UserId) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        let rows = self.rows("get", "user", &sql, &[&id.as_uuid()]).await?;
        rows.first().map(user_from_row).transpose()
    }

    async fn job_get(&self, id: JobId) -> StoreResult<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1");
        let rows = self.rows("get", "job", &sql, &[&id.as_uuid()]).await?;
        rows.first().map(job_from_row).transpose()
    }

    async fn jobs_for_participant(
        &self,
        user: UserId,
        status: Option<JobStatus>,
    ) -> StoreResult<Vec<Job>> {
        let query = JobQuery {
            participant: Some(user),
            status,
            ..Default::default()
        };
        let p = job_predicates(&query);
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs{} ORDER BY job_id", p.where_sql());
        let rows = self.rows("find", "job", &sql, &p.params()).await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn job_find(
        &self,
        query: &JobQuery,
        sort: JobSort,
        page: Pagination,
    ) -> StoreResult<Vec<Job>> {
        let mut p = job_predicates(query);
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs{}{}{}",
            p.where_sql(),
            job_order(sort),
            p.page_sql(page)
        );
        let rows = self.rows("find", "job", &sql, &p.params()).await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn job_count(&self, query: &JobQuery) -> StoreResult<u64> {
        self.count("job", "jobs", &job_predicates(query)).await
    }

    async fn message_find(
        &self,
        query: &MessageQuery,
        sort: MessageSort,
        page: Pagination,
    ) -> StoreResult<Vec<Message>> {
        let mut p = message_predicates(query);
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages{}{}{}",
            p.where_sql(),
            message_order(sort),
            p.page_sql(page)
        );
        let rows = self.rows("find", "message", &sql, &p.params()).await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn message_count(&self, query: &MessageQuery) -> StoreResult<u64> {
        self.count("message", "messages", &message_predicates(query))
            .await
    }

    async fn user_find(
        &self,
        query: &UserQuery,
        sort: UserSort,
        page: Pagination,
    ) -> StoreResult<Vec<User>> {
        let mut p = user_predicates(query);
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users{}{}{}",
            p.where_sql(),
            user_order(sort),
            p.page_sql(page)
        );
        let rows = self.rows("find", "user", &sql, &p.params()).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn user_count(&self, query: &UserQuery) -> StoreResult<u64> {
        self.count("user", "users", &user_predicates(query)).await
    }

    async fn conversation_rollup(
        &self,
        scope: ConversationScope,
    ) -> StoreResult<Vec<ConversationRollup>> {
        let mut p = Predicates::default();
        let viewer = p.bind(scope.participant.as_uuid());
        p.raw(format!(
            "(j.client_id = {viewer} OR j.freelancer_id = {viewer})"
        ));
        if let Some(status) = scope.job_status {
            p.eq("j.status", status.as_str().to_string());
        }
        let sql = format!(
            "WITH scoped AS ( \
                 SELECT m.* FROM messages m JOIN jobs j ON j.job_id = m.job_id{where_sql} \
             ), latest AS ( \
                 SELECT DISTINCT ON (job_id) {MESSAGE_COLUMNS} FROM scoped \
                 ORDER BY job_id, created_at DESC, message_id DESC \
             ), counts AS ( \
                 SELECT job_id, COUNT(*) AS message_count, \
                        COUNT(*) FILTER (WHERE receiver_id = {viewer} AND NOT is_read) AS unread_count \
                 FROM scoped GROUP BY job_id \
             ) \
             SELECT latest.*, counts.message_count, counts.unread_count \
             FROM latest JOIN counts USING (job_id) ORDER BY job_id",
            where_sql = p.where_sql(),
        );
        let rows = self
            .rows("rollup", "conversation", &sql, &p.params())
            .await?;
        rows.iter()
            .map(|row| {
                let last_message = message_from_row(row)?;
                Ok(ConversationRollup {
                    job_id: last_message.job_id,
                    message_count: count_of(row, "message_count", "conversation")?,
                    unread_count: count_of(row, "unread_count", "conversation")?,
                    last_message,
                })
            })
            .collect()
    }

    async fn aggregate(&self, aggregation: Aggregation) -> StoreResult<Vec<Bucket>> {
        let (table, key, extra, range) = aggregation_plan(aggregation);
        let mut p = Predicates::default();
        if let Some(extra) = extra {
            p.raw(extra);
        }
        p.range(aggregation_range_column(aggregation), range);
        let bytes = if table == "messages" {
            "COALESCE(SUM(attachment_size_bytes), 0)::BIGINT"
        } else {
            "0::BIGINT"
        };
        let sql = format!(
            "SELECT {key} AS bucket_key, COUNT(*) AS n, {bytes} AS total_bytes \
             FROM {table}{} GROUP BY 1",
            p.where_sql()
        );
        let rows = self.rows("aggregate", table, &sql, &p.params()).await?;
        let mut buckets = rows
            .iter()
            .map(|row| {
                let key: Option<String> = column(row, "bucket_key", table)?;
                Ok(Bucket::new(
                    key.unwrap_or_default(),
                    count_of(row, "n", table)?,
                    count_of(row, "total_bytes", table)?,
                ))
            })
            .collect::<StoreResult<Vec<Bucket>>>()?;
        sort_buckets(&mut buckets);
        Ok(buckets)
    }

    async fn user_upsert(&self, user: &User) -> StoreResult<()> {
        self.execute(
            "upsert",
            "user",
            "INSERT INTO users (user_id, phone, email, display_name, role, is_verified, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id) DO UPDATE SET phone = EXCLUDED.phone, email = EXCLUDED.email, \
             display_name = EXCLUDED.display_name, role = EXCLUDED.role, \
             is_verified = EXCLUDED.is_verified, updated_at = EXCLUDED.updated_at",
            &[
                &user.user_id.as_uuid(),
                &user.phone,
                &user.email,
                &user.display_name,
                &user.role.as_str(),
                &user.is_verified,
                &user.created_at,
                &user.updated_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn job_upsert(&self, job: &Job) -> StoreResult<()> {
        let freelancer: Option<Uuid> = job.freelancer_id.map(|id| id.as_uuid());
        self.execute(
            "upsert",
            "job",
            "INSERT INTO jobs (job_id, title, description, status, client_id, freelancer_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (job_id) DO UPDATE SET title = EXCLUDED.title, \
             description = EXCLUDED.description, status = EXCLUDED.status, \
             client_id = EXCLUDED.client_id, freelancer_id = EXCLUDED.freelancer_id, \
             updated_at = EXCLUDED.updated_at",
            &[
                &job.job_id.as_uuid(),
                &job.title,
                &job.description,
                &job.status.as_str(),
                &job.client_id.as_uuid(),
                &freelancer,
                &job.created_at,
                &job.updated_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn message_insert(&self, message: &Message) -> StoreResult<()> {
        let attachment = message.attachment.as_ref();
        let size = attachment
            .map(|a| i64::try_from(a.size_bytes))
            .transpose()
            .map_err(|_| StoreError::Query {
                reason: "attachment size exceeds BIGINT".to_string(),
            })?;
        self.execute(
            "insert",
            "message",
            "INSERT INTO messages (message_id, job_id, sender_id, receiver_id, message, message_type, \
             attachment_url, attachment_file_name, attachment_mime_type, attachment_size_bytes, \
             is_read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            &[
                &message.message_id.as_uuid(),
                &message.job_id.as_uuid(),
                &message.sender_id.as_uuid(),
                &message.receiver_id.as_uuid(),
                &message.message,
                &message.message_type.as_str(),
                &attachment.map(|a| a.url.as_str()),
                &attachment.map(|a| a.file_name.as_str()),
                &attachment.map(|a| a.mime_type.as_str()),
                &size,
                &message.is_read,
                &message.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn messages_mark_read(
        &self,
        job: JobId,
        reader: UserId,
    ) -> StoreResult<Vec<MessageId>> {
        let rows = self
            .rows(
                "mark_read",
                "message",
                "UPDATE messages SET is_read = TRUE \
                 WHERE job_id = $1 AND receiver_id = $2 AND NOT is_read \
                 RETURNING message_id",
                &[&job.as_uuid(), &reader.as_uuid()],
            )
            .await?;
        let mut changed = rows
            .iter()
            .map(|row| column::<Uuid>(row, "message_id", "message").map(MessageId::from_uuid))
            .collect::<StoreResult<Vec<MessageId>>>()?;
        changed.sort();
        Ok(changed)
    }

    async fn notification_insert(&self, notification: &Notification) -> StoreResult<()> {
        self.execute(
            "insert",
            "notification",
            "INSERT INTO notifications (notification_id, user_id, kind, title, is_read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (notification_id) DO NOTHING",
            &[
                &notification.notification_id.as_uuid(),
                &notification.user_id.as_uuid(),
                &notification.kind.as_str(),
                &notification.title,
                &notification.is_read,
                &notification.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.rows("ping", "database", "SELECT 1", &[]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gigbridge_core::MessageType;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("sink"), "%sink%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn test_message_predicates_number_parameters_in_order() {
        let job = JobId::new();
        let query = MessageQuery {
            job_scope: Some(vec![job]),
            message_type: Some(MessageType::Image),
            has_attachment: Some(true),
            text: Some("invoice".to_string()),
            created: DateRange::new(Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()), None),
            ..Default::default()
        };
        let mut p = message_predicates(&query);
        assert_eq!(
            p.where_sql(),
            " WHERE job_id = ANY($1) AND message_type = $2 AND attachment_url IS NOT NULL \
             AND (message ILIKE $3) AND created_at >= $4"
        );
        assert_eq!(p.page_sql(Pagination::default()), " LIMIT $5 OFFSET $6");
        assert_eq!(p.params().len(), 6);
    }

    #[test]
    fn test_participant_predicate_reuses_placeholder() {
        let query = JobQuery {
            participant: Some(UserId::new()),
            status: Some(JobStatus::Assigned),
            ..Default::default()
        };
        let p = job_predicates(&query);
        assert_eq!(
            p.where_sql(),
            " WHERE (client_id = $1 OR freelancer_id = $1) AND status = $2"
        );
        assert_eq!(p.params().len(), 2);
    }

    #[test]
    fn test_empty_predicates_have_no_where() {
        let p = user_predicates(&UserQuery::default());
        assert_eq!(p.where_sql(), "");
    }

    #[test]
    fn test_order_clauses_break_ties_on_id() {
        let sort = MessageSort::new(MessageSortField::Message, SortDirection::Asc);
        assert_eq!(
            message_order(sort),
            " ORDER BY message COLLATE \"C\" ASC, message_id ASC"
        );
        assert_eq!(
            user_order(UserSort::default()),
            " ORDER BY created_at DESC, user_id DESC"
        );
    }

    #[test]
    fn test_verification_groups_by_update_time() {
        let aggregation = Aggregation::Users {
            by: UserFacet::Verification,
            range: DateRange::default(),
        };
        assert_eq!(aggregation_range_column(aggregation), "updated_at");
        let files = Aggregation::Messages {
            by: MessageFacet::MessageType,
            range: DateRange::default(),
            attachments_only: true,
        };
        let (table, _, extra, _) = aggregation_plan(files);
        assert_eq!(table, "messages");
        assert_eq!(extra, Some("attachment_url IS NOT NULL"));
    }

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "gigbridge");
        assert!(!config.apply_schema);
    }
}
