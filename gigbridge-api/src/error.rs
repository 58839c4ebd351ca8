//! Error Types for the GigBridge API
//!
//! Every failure leaves the service as `{ "code", "message", "details"? }`
//! with the HTTP status fixed by the code. Domain errors from the core
//! crate are folded in through `From<GigError>`; store internals stay in the
//! log and never reach the response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gigbridge_core::{AuthorizationError, GigError, StoreError, ValidationErrors};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No usable principal headers.
    Unauthorized,
    /// Principal lacks the role, or targets someone else's resource.
    Forbidden,
    /// One or more query parameters were rejected; see `details.errors`.
    ValidationFailed,
    InvalidInput,
    /// A path segment is not an id.
    InvalidFormat,
    EntityNotFound,
    TooManyRequests,
    InternalError,
    /// The persistent store rejected a query or returned undecodable rows.
    DatabaseError,
    /// The persistent store cannot be reached.
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        use ErrorCode::*;
        match self {
            Unauthorized => StatusCode::UNAUTHORIZED,
            Forbidden => StatusCode::FORBIDDEN,
            ValidationFailed | InvalidInput | InvalidFormat => StatusCode::BAD_REQUEST,
            EntityNotFound => StatusCode::NOT_FOUND,
            TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            InternalError | DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// API ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Per-field violations for validation failures; entity context for
    /// malformed ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// A path segment that should have been an entity id.
    pub fn invalid_id(entity: &str, path: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Invalid {entity} id in '{path}': {reason}"),
        )
        .with_details(serde_json::json!({ "entityType": entity, "path": path }))
    }

    pub fn entity_not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::EntityNotFound, format!("{entity} {id} not found"))
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::TooManyRequests,
            format!("Too many requests, retry in {retry_after_secs}s"),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

// ============================================================================
// DOMAIN CONVERSIONS
// ============================================================================

impl From<GigError> for ApiError {
    fn from(err: GigError) -> Self {
        match err {
            GigError::Validation(errors) => errors.into(),
            GigError::Authorization(AuthorizationError::AdminRequired { operation }) => {
                ApiError::forbidden(format!("Admin role required to {operation}"))
            }
            GigError::Authorization(AuthorizationError::Unauthenticated { reason }) => {
                ApiError::unauthorized(reason)
            }
            GigError::Store(e) => e.into(),
            GigError::Cache(e) => {
                // The cache layer fails open, so reaching here is a bug.
                tracing::error!(error = %e, "Cache error escaped the cache layer");
                ApiError::internal_error("Internal server error")
            }
            GigError::Config(e) => ApiError::internal_error(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { reason } => {
                tracing::error!(reason = %reason, "Persistent store unavailable");
                ApiError::new(ErrorCode::ServiceUnavailable, "Persistent store unavailable")
            }
            other => {
                tracing::error!(error = %other, "Store operation failed");
                ApiError::database_error("Query failed")
            }
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let violations = serde_json::to_value(errors.violations()).unwrap_or_default();
        ApiError::new(
            ErrorCode::ValidationFailed,
            format!("{} invalid parameter(s)", errors.len()),
        )
        .with_details(serde_json::json!({ "errors": violations }))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
