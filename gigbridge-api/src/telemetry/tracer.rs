//! Global `tracing` subscriber.
//!
//! `RUST_LOG` wins when set. Output is JSON lines unless
//! `GIGBRIDGE_LOG_FORMAT=pretty`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILTER: &str =
    "info,gigbridge_api=debug,gigbridge_query=info,gigbridge_storage=info,tower_http=debug";

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    /// Free-form deployment label, logged once at startup.
    pub environment: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let var = |key: &str, fallback: &str| std::env::var(key).unwrap_or_else(|_| fallback.to_string());
        Self {
            service_name: var("GIGBRIDGE_SERVICE_NAME", "gigbridge-api"),
            service_version: var("GIGBRIDGE_SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
            environment: var("GIGBRIDGE_ENVIRONMENT", "development"),
            json_logs: var("GIGBRIDGE_LOG_FORMAT", "json") != "pretty",
        }
    }
}

/// Install the subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| ApiError::internal_error(format!("Logging setup failed: {e}")))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        json = config.json_logs,
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Restores an environment variable on drop.
    struct ScopedVar(&'static str, Option<String>);

    impl ScopedVar {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self(key, previous)
        }
    }

    impl Drop for ScopedVar {
        fn drop(&mut self) {
            match &self.1 {
                Some(v) => std::env::set_var(self.0, v),
                None => std::env::remove_var(self.0),
            }
        }
    }

    #[test]
    fn test_json_logs_unless_pretty() {
        let _name = ScopedVar::set("GIGBRIDGE_SERVICE_NAME", None);
        {
            let _format = ScopedVar::set("GIGBRIDGE_LOG_FORMAT", None);
            let config = TelemetryConfig::default();
            assert_eq!(config.service_name, "gigbridge-api");
            assert!(config.json_logs);
        }
        let _format = ScopedVar::set("GIGBRIDGE_LOG_FORMAT", Some("pretty"));
        assert!(!TelemetryConfig::default().json_logs);
    }
}
