//! GigBridge API - REST Layer
//!
//! Axum routes over the query layer: search, analytics and cached entity
//! access, with store-backed rate limiting, Prometheus metrics and an
//! OpenAPI document. The trusted gateway in front of this service resolves
//! the caller and forwards it in the `x-user-id` and `x-user-role` headers.

#[macro_use]
mod macros;

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::{resolve_bind_addr, ApiConfig};
pub use db::{DbConfig, PgMarketplaceStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use extractors::{PathId, PrincipalExtractor};
pub use openapi::ApiDoc;
pub use routes::{cached_response, create_api_router, Envelope};
pub use state::AppState;
