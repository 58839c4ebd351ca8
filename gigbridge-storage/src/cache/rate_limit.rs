//! Fixed-window rate limiting over the shared cache store.
//!
//! Counters live in the cache store rather than in process memory, so
//! limits hold across restarts and across instances. Window keys are
//! `ratelimit:<scope>:<window index>` and are created with the window's
//! expiry in the same step as the first increment.

use gigbridge_core::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::traits::CacheStore;

/// Decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

pub struct FixedWindowRateLimiter {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    limit: u32,
    window: Duration,
}

impl FixedWindowRateLimiter {
    /// Allow `limit` requests per `window` for each scope.
    pub fn new(store: Arc<dyn CacheStore>, limit: u32, window: Duration) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            limit,
            window: window.max(Duration::from_secs(1)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window index and the time left until it closes.
    fn current_window(&self) -> (i64, Duration) {
        let now_ms = self.clock.now().timestamp_millis();
        let window_ms = self.window.as_millis() as i64;
        let index = now_ms.div_euclid(window_ms);
        let remaining_ms = window_ms - now_ms.rem_euclid(window_ms);
        (index, Duration::from_millis(remaining_ms as u64))
    }

    pub fn key(scope: &str, index: i64) -> String {
        format!("ratelimit:{scope}:{index}")
    }

    /// Count one request against `scope`. Fails open when the store is down.
    pub async fn check(&self, scope: &str) -> RateDecision {
        let (index, retry_after) = self.current_window();
        let key = Self::key(scope, index);

        let count = match self.store.increment_within(&key, 1, self.window).await {
            Ok(count) => count,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Rate limiter store failed, allowing request");
                return RateDecision::Allowed {
                    remaining: self.limit,
                };
            }
        };

        if count <= i64::from(self.limit) {
            RateDecision::Allowed {
                remaining: self.limit - count as u32,
            }
        } else {
            RateDecision::Limited { retry_after }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCacheStore;
    use chrono::{TimeZone, Utc};
    use gigbridge_core::FixedClock;

    fn limiter(store: Arc<InMemoryCacheStore>, clock: Arc<FixedClock>) -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::new(store, 3, Duration::from_secs(60)).with_clock(clock)
    }

    #[tokio::test]
    async fn test_limits_within_window_and_resets_next_window() {
        let store = Arc::new(InMemoryCacheStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 15).unwrap(),
        ));
        let limiter = limiter(Arc::clone(&store), Arc::clone(&clock));

        assert_eq!(limiter.check("10.0.0.1").await, RateDecision::Allowed { remaining: 2 });
        assert_eq!(limiter.check("10.0.0.1").await, RateDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.check("10.0.0.1").await, RateDecision::Allowed { remaining: 0 });
        assert_eq!(
            limiter.check("10.0.0.1").await,
            RateDecision::Limited {
                retry_after: Duration::from_secs(45)
            }
        );

        // Other scopes are independent.
        assert!(limiter.check("10.0.0.2").await.is_allowed());

        clock.advance(chrono::Duration::seconds(45));
        assert_eq!(limiter.check("10.0.0.1").await, RateDecision::Allowed { remaining: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_counter_expires_with_its_window() {
        let store = Arc::new(InMemoryCacheStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let limiter = limiter(Arc::clone(&store), Arc::clone(&clock));

        limiter.check("10.0.0.1").await;
        limiter.check("10.0.0.1").await;
        let key = store.keys().pop().unwrap();
        assert!(key.starts_with("ratelimit:10.0.0.1:"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_fails_open_when_store_unavailable() {
        let store = Arc::new(InMemoryCacheStore::new());
        store.set_available(false);
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let limiter = limiter(store, clock);

        for _ in 0..10 {
            assert!(limiter.check("10.0.0.1").await.is_allowed());
        }
    }
}
