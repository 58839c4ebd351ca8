//! Principal extraction from gateway headers.
//!
//! The upstream authentication gateway verifies credentials and forwards the
//! caller as `x-user-id` / `x-user-role`. Nothing here checks a credential;
//! a missing or malformed header is a 401.

use axum::{extract::FromRequestParts, http::request::Parts};
use gigbridge_core::{AuthorizationError, GigError, Principal, UserId, UserRole};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Extractor for the authenticated [`Principal`].
#[derive(Debug, Clone, Copy)]
pub struct PrincipalExtractor(pub Principal);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| unauthenticated(format!("Missing {} header", name)))
}

fn unauthenticated(reason: String) -> ApiError {
    GigError::from(AuthorizationError::Unauthenticated { reason }).into()
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for PrincipalExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_id = header(parts, USER_ID_HEADER)?;
        let user_id: UserId = raw_id
            .parse()
            .map_err(|_| unauthenticated(format!("Malformed {} header", USER_ID_HEADER)))?;

        let raw_role = header(parts, USER_ROLE_HEADER)?;
        let role: UserRole = raw_role
            .parse()
            .map_err(|_| unauthenticated(format!("Malformed {} header", USER_ROLE_HEADER)))?;

        Ok(PrincipalExtractor(Principal::new(user_id, role)))
    }
}

impl std::ops::Deref for PrincipalExtractor {
    type Target = Principal;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
