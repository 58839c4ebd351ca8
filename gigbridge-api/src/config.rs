//! HTTP-facing settings: CORS, the per-IP request budget and the listen
//! address. Everything comes from `GIGBRIDGE_*` variables; unset or
//! unparseable values fall back to the development defaults below.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Exact origins, or `*.domain` to admit any https subdomain. Empty
    /// admits every origin.
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,
    pub cors_max_age_secs: u64,

    pub rate_limit_enabled: bool,
    /// Budget per client IP per window.
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 24 * 60 * 60,
            rate_limit_enabled: true,
            rate_limit_requests: 100,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

fn env_flag(key: &str, fallback: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

impl ApiConfig {
    /// Reads `GIGBRIDGE_CORS_ORIGINS` (comma separated),
    /// `GIGBRIDGE_CORS_ALLOW_CREDENTIALS`, `GIGBRIDGE_CORS_MAX_AGE_SECS`,
    /// `GIGBRIDGE_RATE_LIMIT_ENABLED`, `GIGBRIDGE_RATE_LIMIT_REQUESTS` and
    /// `GIGBRIDGE_RATE_LIMIT_WINDOW_SECS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        let cors_origins = std::env::var("GIGBRIDGE_CORS_ORIGINS")
            .map(|list| parse_origins(&list))
            .unwrap_or_default();

        Self {
            cors_origins,
            cors_allow_credentials: env_flag("GIGBRIDGE_CORS_ALLOW_CREDENTIALS", d.cors_allow_credentials),
            cors_max_age_secs: env_or("GIGBRIDGE_CORS_MAX_AGE_SECS", d.cors_max_age_secs),
            rate_limit_enabled: env_flag("GIGBRIDGE_RATE_LIMIT_ENABLED", d.rate_limit_enabled),
            rate_limit_requests: env_or("GIGBRIDGE_RATE_LIMIT_REQUESTS", d.rate_limit_requests),
            rate_limit_window: Duration::from_secs(env_or(
                "GIGBRIDGE_RATE_LIMIT_WINDOW_SECS",
                d.rate_limit_window.as_secs(),
            )),
        }
    }

    /// Strict CORS applies once any origin is configured.
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty()
            || self.cors_origins.iter().any(|allowed| origin_matches(allowed, origin))
    }
}

fn parse_origins(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

fn origin_matches(allowed: &str, origin: &str) -> bool {
    match allowed.strip_prefix("*.") {
        Some(domain) => origin
            .strip_prefix("https://")
            .and_then(|host| host.strip_suffix(domain))
            .is_some_and(|sub| sub.ends_with('.') && sub.len() > 1),
        None => allowed == origin,
    }
}

/// Listen address from `GIGBRIDGE_API_BIND` (default `0.0.0.0`) and `PORT`,
/// then `GIGBRIDGE_API_PORT`, then 3000.
pub fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("GIGBRIDGE_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT")
        .or_else(|_| std::env::var("GIGBRIDGE_API_PORT"))
        .unwrap_or_else(|_| "3000".to_string());
    bind_addr(&host, &port)
}

fn bind_addr(host: &str, port: &str) -> ApiResult<SocketAddr> {
    let port: u16 = port
        .parse()
        .map_err(|_| ApiError::invalid_input(format!("Port {port:?} is not a number in 0..=65535")))?;
    let addr = format!("{host}:{port}");
    addr.parse()
        .map_err(|e| ApiError::invalid_input(format!("Cannot listen on {addr}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_permissive_dev_mode() {
        let config = ApiConfig::default();
        assert!(!config.is_production());
        assert!(config.is_origin_allowed("http://localhost:5173"));
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_requests, 100);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
    }

    #[test]
    fn test_wildcard_origin_needs_a_real_subdomain() {
        let config = ApiConfig {
            cors_origins: parse_origins("https://gigbridge.dev, *.gigbridge.dev,"),
            ..ApiConfig::default()
        };

        assert_eq!(config.cors_origins.len(), 2);
        assert!(config.is_origin_allowed("https://gigbridge.dev"));
        assert!(config.is_origin_allowed("https://app.gigbridge.dev"));
        assert!(!config.is_origin_allowed("http://app.gigbridge.dev"));
        assert!(!config.is_origin_allowed("https://evilgigbridge.dev"));
        assert!(!config.is_origin_allowed("https://.gigbridge.dev"));
        assert!(!config.is_origin_allowed("https://evil.com"));
    }

    #[test]
    fn test_bind_addr() {
        assert_eq!(
            bind_addr("127.0.0.1", "8080").unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert!(bind_addr("0.0.0.0", "http").is_err());
        assert!(bind_addr("0.0.0.0", "70000").is_err());
        assert!(bind_addr("not an ip", "80").is_err());
    }
}
