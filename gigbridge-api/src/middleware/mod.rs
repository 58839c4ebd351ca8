//! HTTP middleware.

mod rate_limit;

pub use rate_limit::{extract_client_ip, rate_limit_middleware, RateLimitError};
