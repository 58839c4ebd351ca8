//! Cache configuration: backend location, TTL profile and timeouts.

use gigbridge_core::ConfigError;
use std::time::Duration;

use super::redis_backend::ReconnectPolicy;

/// TTLs per cached result family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlProfile {
    pub user: Duration,
    pub job: Duration,
    pub job_list: Duration,
    pub message_search: Duration,
    pub conversation_search: Duration,
    pub user_search: Duration,
    pub suggestions: Duration,
    pub analytics: Duration,
}

impl Default for TtlProfile {
    fn default() -> Self {
        Self {
            user: Duration::from_secs(30 * 60),
            job: Duration::from_secs(10 * 60),
            job_list: Duration::from_secs(10 * 60),
            message_search: Duration::from_secs(5 * 60),
            conversation_search: Duration::from_secs(5 * 60),
            user_search: Duration::from_secs(15 * 60),
            suggestions: Duration::from_secs(5 * 60),
            analytics: Duration::from_secs(30 * 60),
        }
    }
}

/// Which cache store to open at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendKind {
    Redis { url: String },
    Memory,
}

/// Settings for the cache layer.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    pub ttl: TtlProfile,
    /// How long a caller waits on a computation before running it directly.
    pub compute_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Redis {
                url: "redis://127.0.0.1:6379/".to_string(),
            },
            ttl: TtlProfile::default(),
            compute_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the in-process store.
    pub fn in_memory() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            ..Self::default()
        }
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.backend = CacheBackendKind::Redis { url: url.into() };
        self
    }

    pub fn with_ttl(mut self, ttl: TtlProfile) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_compute_timeout(mut self, timeout: Duration) -> Self {
        self.compute_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Load from environment variables.
    ///
    /// - `GIGBRIDGE_CACHE_BACKEND`: `redis` (default) or `memory`
    /// - `GIGBRIDGE_REDIS_URL`: Redis URL (default `redis://127.0.0.1:6379/`)
    /// - `GIGBRIDGE_CACHE_TTL_<FAMILY>_SECS` for `USER`, `JOB`, `JOB_LIST`,
    ///   `MESSAGE_SEARCH`, `CONVERSATION_SEARCH`, `USER_SEARCH`, `SUGGESTIONS`, `ANALYTICS`
    /// - `GIGBRIDGE_CACHE_COMPUTE_TIMEOUT_MS` (default 10000)
    /// - `GIGBRIDGE_REDIS_RECONNECT_BASE_MS`, `GIGBRIDGE_REDIS_RECONNECT_MAX_MS`,
    ///   `GIGBRIDGE_REDIS_RECONNECT_RETRIES`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = match std::env::var("GIGBRIDGE_CACHE_BACKEND")
            .unwrap_or_else(|_| "redis".to_string())
            .to_lowercase()
            .as_str()
        {
            "redis" => CacheBackendKind::Redis {
                url: std::env::var("GIGBRIDGE_REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string()),
            },
            "memory" => CacheBackendKind::Memory,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "GIGBRIDGE_CACHE_BACKEND".to_string(),
                    value: other.to_string(),
                    reason: "expected redis or memory".to_string(),
                })
            }
        };

        let d = defaults.ttl;
        let ttl = TtlProfile {
            user: env_secs("GIGBRIDGE_CACHE_TTL_USER_SECS", d.user)?,
            job: env_secs("GIGBRIDGE_CACHE_TTL_JOB_SECS", d.job)?,
            job_list: env_secs("GIGBRIDGE_CACHE_TTL_JOB_LIST_SECS", d.job_list)?,
            message_search: env_secs("GIGBRIDGE_CACHE_TTL_MESSAGE_SEARCH_SECS", d.message_search)?,
            conversation_search: env_secs(
                "GIGBRIDGE_CACHE_TTL_CONVERSATION_SEARCH_SECS",
                d.conversation_search,
            )?,
            user_search: env_secs("GIGBRIDGE_CACHE_TTL_USER_SEARCH_SECS", d.user_search)?,
            suggestions: env_secs("GIGBRIDGE_CACHE_TTL_SUGGESTIONS_SECS", d.suggestions)?,
            analytics: env_secs("GIGBRIDGE_CACHE_TTL_ANALYTICS_SECS", d.analytics)?,
        };

        let r = defaults.reconnect;
        let reconnect = ReconnectPolicy {
            base_delay: env_millis("GIGBRIDGE_REDIS_RECONNECT_BASE_MS", r.base_delay)?,
            max_delay: env_millis("GIGBRIDGE_REDIS_RECONNECT_MAX_MS", r.max_delay)?,
            max_retries: env_parse("GIGBRIDGE_REDIS_RECONNECT_RETRIES", r.max_retries)?,
            connect_timeout: r.connect_timeout,
        };

        Ok(Self {
            backend,
            ttl,
            compute_timeout: env_millis("GIGBRIDGE_CACHE_COMPUTE_TIMEOUT_MS", defaults.compute_timeout)?,
            reconnect,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw,
            reason: "not a valid number".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = env_parse(key, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: key.to_string(),
            value: "0".to_string(),
            reason: "TTL must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn env_millis(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let millis = env_parse(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttl_profile() {
        let ttl = TtlProfile::default();
        assert_eq!(ttl.user, Duration::from_secs(1800));
        assert_eq!(ttl.job_list, Duration::from_secs(600));
        assert_eq!(ttl.message_search, Duration::from_secs(300));
        assert_eq!(ttl.conversation_search, Duration::from_secs(300));
        assert_eq!(ttl.user_search, Duration::from_secs(900));
        assert_eq!(ttl.suggestions, Duration::from_secs(300));
        assert_eq!(ttl.analytics, Duration::from_secs(1800));
    }

    #[test]
    fn test_settings_builder() {
        let settings = CacheSettings::new()
            .with_redis_url("redis://cache:6379/1")
            .with_compute_timeout(Duration::from_secs(3));
        assert_eq!(
            settings.backend,
            CacheBackendKind::Redis {
                url: "redis://cache:6379/1".to_string()
            }
        );
        assert_eq!(settings.compute_timeout, Duration::from_secs(3));
        assert_eq!(CacheSettings::in_memory().backend, CacheBackendKind::Memory);
    }
}
