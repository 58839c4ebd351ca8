//! Typed entity ids from path parameters.

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use gigbridge_core::EntityIdType;
use uuid::Uuid;

use crate::error::ApiError;

/// `Path<Uuid>` narrowed to one entity's id type.
///
/// A segment that is not a UUID is rejected with `INVALID_FORMAT` and the
/// entity name in `details.entityType`.
#[derive(Debug, Clone, Copy)]
pub struct PathId<T: EntityIdType>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for PathId<T>
where
    S: Send + Sync,
    T: EntityIdType + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<Uuid>::from_request_parts(parts, state).await {
            Ok(Path(uuid)) => Ok(PathId(T::from_uuid(uuid))),
            Err(rejection) => Err(ApiError::invalid_id(
                T::ENTITY_NAME,
                parts.uri.path(),
                rejection.body_text(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use gigbridge_core::JobId;
    use tower::ServiceExt;

    fn app() -> Router {
        async fn handler(PathId(job_id): PathId<JobId>) -> String {
            job_id.to_string()
        }
        Router::new().route("/jobs/:id", get(handler))
    }

    #[tokio::test]
    async fn test_valid_uuid_extracts_typed_id() {
        let id = JobId::new();
        let response = app()
            .oneshot(
                Request::builder()
                    .uri(format!("/jobs/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, id.to_string());
    }

    #[tokio::test]
    async fn test_invalid_uuid_names_the_entity() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/jobs/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["details"]["entityType"], "job");
        assert_eq!(json["code"], "INVALID_FORMAT");
    }
}
