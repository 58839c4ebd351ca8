//! Redis cache store.
//!
//! One `ConnectionManager` is shared by every caller. It is opened lazily on
//! first use and reopened on a capped exponential schedule after failures.
//! Once the retry budget is spent the store fails fast with
//! `StoreUnavailable` and only probes the server every `max_delay` until a
//! connection succeeds again.

use async_trait::async_trait;
use gigbridge_core::CacheError;
use redis::aio::ConnectionManager;
use redis::RedisError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::traits::{ttl_secs, CacheResult, CacheStore};

const BACKEND: &str = "redis";
const SCAN_BATCH: usize = 500;

/// Reconnect schedule for the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay, and the probe interval once
    /// `max_retries` is exhausted.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before switching to fail-fast probing.
    pub max_retries: u32,
    /// Bound on a single connection attempt.
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(3),
            max_retries: 10,
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        if failures > self.max_retries {
            return self.max_delay;
        }
        let exponent = (failures - 1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// True once the retry budget is spent.
    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_retries
    }
}

#[derive(Default)]
struct ConnectionState {
    manager: Option<ConnectionManager>,
    failures: u32,
    retry_at: Option<Instant>,
}

/// Cache store backed by a Redis server.
pub struct RedisCacheStore {
    client: redis::Client,
    policy: ReconnectPolicy,
    state: Mutex<ConnectionState>,
}

impl std::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RedisCacheStore {
    /// Build a store for `url`. No connection is made until the first call.
    pub fn new(url: &str, policy: ReconnectPolicy) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Command {
            command: "OPEN".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            policy,
            state: Mutex::new(ConnectionState::default()),
        })
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        let mut state = self.state.lock().await;
        if let Some(manager) = &state.manager {
            return Ok(manager.clone());
        }

        let now = Instant::now();
        if let Some(retry_at) = state.retry_at {
            if now < retry_at {
                return Err(unavailable(format!(
                    "reconnect backoff, {} consecutive failures",
                    state.failures
                )));
            }
        }

        let attempt = tokio::time::timeout(
            self.policy.connect_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await;

        match attempt {
            Ok(Ok(manager)) => {
                if state.failures > 0 {
                    info!(failures = state.failures, "Redis connection restored");
                } else {
                    debug!("Redis connection established");
                }
                state.failures = 0;
                state.retry_at = None;
                state.manager = Some(manager.clone());
                Ok(manager)
            }
            Ok(Err(e)) => Err(self.record_failure(&mut state, e.to_string())),
            Err(_) => Err(self.record_failure(&mut state, "connect timed out".to_string())),
        }
    }

    fn record_failure(&self, state: &mut ConnectionState, reason: String) -> CacheError {
        state.failures = state.failures.saturating_add(1);
        state.manager = None;
        let delay = self.policy.delay_for(state.failures);
        state.retry_at = Some(Instant::now() + delay);

        if self.policy.exhausted(state.failures) {
            error!(
                failures = state.failures,
                probe_ms = delay.as_millis() as u64,
                reason = %reason,
                "Redis unreachable, failing fast until next probe"
            );
        } else {
            warn!(
                failures = state.failures,
                retry_in_ms = delay.as_millis() as u64,
                reason = %reason,
                "Redis connection failed"
            );
        }
        unavailable(reason)
    }

    /// Map a command error, dropping the shared connection when the error
    /// means the link itself is broken.
    async fn command_error(&self, command: &str, e: RedisError) -> CacheError {
        if is_connection_error(&e) {
            let mut state = self.state.lock().await;
            self.record_failure(&mut state, format!("{command}: {e}"))
        } else {
            CacheError::Command {
                command: command.to_string(),
                reason: e.to_string(),
            }
        }
    }

    async fn run<T: redis::FromRedisValue>(
        &self,
        command: &str,
        cmd: &redis::Cmd,
    ) -> CacheResult<T> {
        let mut conn = self.connection().await?;
        match cmd.query_async(&mut conn).await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.command_error(command, e).await),
        }
    }
}

fn unavailable(reason: String) -> CacheError {
    CacheError::StoreUnavailable {
        backend: BACKEND.to_string(),
        reason,
    }
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

/// Escape Redis glob metacharacters so `prefix` matches literally.
pub fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 4);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.run("GET", redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.run(
            "SET",
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs(ttl)),
        )
        .await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let removed: i64 = self.run("DEL", redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = self
                .run(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH),
                )
                .await?;

            if !keys.is_empty() {
                let removed: i64 = self.run("UNLINK", redis::cmd("UNLINK").arg(&keys)).await?;
                deleted += u64::try_from(removed).unwrap_or(0);
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix = %prefix, deleted, "Deleted keys by prefix");
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let count: i64 = self.run("EXISTS", redis::cmd("EXISTS").arg(key)).await?;
        Ok(count > 0)
    }

    async fn increment(&self, key: &str, amount: i64) -> CacheResult<i64> {
        self.run("INCRBY", redis::cmd("INCRBY").arg(key).arg(amount))
            .await
    }

    async fn increment_within(&self, key: &str, amount: i64, ttl: Duration) -> CacheResult<i64> {
        // SET NX EX creates the counter with its expiry; MULTI keeps the pair
        // indivisible so no counter is ever left without a TTL.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .arg("NX")
            .ignore()
            .cmd("INCRBY")
            .arg(key)
            .arg(amount);

        let mut conn = self.connection().await?;
        let result: Result<(i64,), RedisError> = pipe.query_async(&mut conn).await;
        match result {
            Ok((count,)) => Ok(count),
            Err(e) => Err(self.command_error("INCRBY", e).await),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let applied: i64 = self
            .run("EXPIRE", redis::cmd("EXPIRE").arg(key).arg(ttl_secs(ttl)))
            .await?;
        Ok(applied == 1)
    }

    async fn ping(&self) -> CacheResult<()> {
        let _: String = self.run("PING", &redis::cmd("PING")).await?;
        Ok(())
    }
}
