//! Error types for GigBridge operations

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single malformed request field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: '{value}' - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{field} must be between {min} and {max}, got {got}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        got: i64,
    },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("dateFrom {from} is after dateTo {to}")]
    InvertedDateRange { from: String, to: String },
}

impl ValidationError {
    /// Name of the offending request field, as the caller spelled it.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::InvalidValue { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::RequiredFieldMissing { field } => field,
            ValidationError::InvertedDateRange { .. } => "dateFrom",
        }
    }

    pub fn invalid(field: &str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Per-field detail entry as reported to HTTP callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Every validation failure found in one request.
///
/// Parameter parsing keeps going after the first bad field so the caller
/// can fix all of them in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// True when at least one error names `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field() == field)
    }

    pub fn violations(&self) -> Vec<FieldViolation> {
        self.errors
            .iter()
            .map(|e| FieldViolation {
                field: e.field().to_string(),
                message: e.to_string(),
            })
            .collect()
    }

    /// `Ok(value)` when nothing was collected, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no validation errors"),
            [single] => write!(f, "{}", single),
            many => {
                write!(f, "{} invalid fields: ", many.len())?;
                for (i, e) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Persistent store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Persistent store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Query failed: {reason}")]
    Query { reason: String },

    #[error("Failed to decode {entity} row: {reason}")]
    Decode { entity: String, reason: String },
}

/// Cache backend errors.
///
/// `StoreUnavailable` is the only variant the cache-aside path treats as a
/// reason to degrade; callers of the raw store may see the others.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache store {backend} unavailable: {reason}")]
    StoreUnavailable { backend: String, reason: String },

    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Cache command {command} failed: {reason}")]
    Command { command: String, reason: String },
}

impl CacheError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::StoreUnavailable { .. })
    }
}

/// Authorization errors raised before any query is built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Operation {operation} requires the admin role")]
    AdminRequired { operation: String },

    #[error("Missing or malformed principal: {reason}")]
    Unauthenticated { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all GigBridge errors.
#[derive(Debug, Clone, Error)]
pub enum GigError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ValidationError> for GigError {
    fn from(error: ValidationError) -> Self {
        GigError::Validation(error.into())
    }
}

/// Result type alias for GigBridge operations.
pub type GigResult<T> = Result<T, GigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_collects_all_fields() {
        let mut errors = ValidationErrors::new();
        errors.push(ValidationError::invalid("messageType", "video", "expected text, image or file"));
        errors.push(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: 100,
            got: 500,
        });

        assert_eq!(errors.len(), 2);
        assert!(errors.has_field("messageType"));
        assert!(errors.has_field("limit"));

        let violations = errors.violations();
        assert_eq!(violations[0].field, "messageType");
        assert!(violations[1].message.contains("500"));

        let msg = errors.to_string();
        assert!(msg.starts_with("2 invalid fields"));
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ValidationErrors::new().into_result(7), Ok(7));

        let err: ValidationErrors = ValidationError::RequiredFieldMissing {
            field: "query".to_string(),
        }
        .into();
        assert!(err.into_result(()).is_err());
    }

    #[test]
    fn test_inverted_range_reports_date_from() {
        let err = ValidationError::InvertedDateRange {
            from: "2024-02-01".to_string(),
            to: "2024-01-01".to_string(),
        };
        assert_eq!(err.field(), "dateFrom");
        assert!(err.to_string().contains("after"));
    }

    #[test]
    fn test_cache_error_unavailable() {
        let err = CacheError::StoreUnavailable {
            backend: "redis".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("redis"));

        let cmd = CacheError::Command {
            command: "SET".to_string(),
            reason: "WRONGTYPE".to_string(),
        };
        assert!(!cmd.is_unavailable());
    }

    #[test]
    fn test_gig_error_from_variants() {
        let validation = GigError::from(ValidationError::RequiredFieldMissing {
            field: "q".to_string(),
        });
        assert!(matches!(validation, GigError::Validation(_)));

        let store = GigError::from(StoreError::Query {
            reason: "boom".to_string(),
        });
        assert!(matches!(store, GigError::Store(_)));

        let auth = GigError::from(AuthorizationError::AdminRequired {
            operation: "search users".to_string(),
        });
        assert!(matches!(auth, GigError::Authorization(_)));

        let config = GigError::from(ConfigError::MissingRequired {
            field: "GIGBRIDGE_DB_HOST".to_string(),
        });
        assert!(matches!(config, GigError::Config(_)));
    }
}
