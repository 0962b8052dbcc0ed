//! Envelope-preserving extractors.
//!
//! Axum's stock `Path`/`Query`/`Json` rejections answer with plain-text
//! bodies, which would bypass the error envelope. These wrappers delegate to
//! the stock extractors and convert their rejections into `ApiError`, so a
//! malformed path id, query string, or JSON body comes back in the same
//! shape as every other error.

use crate::errors::ApiError;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub struct Path<T>(pub T);

impl<S, T> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(value) =
            axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

pub struct Query<T>(pub T);

impl<S, T> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) =
            axum::extract::Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Works both ways: request bodies deserialize through it, and handlers
/// return it as a JSON response.
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode, header};
    use axum::routing::{get, patch};
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Deserialize)]
    struct PageQuery {
        page: u32,
    }

    #[derive(Deserialize)]
    struct RenameBody {
        name: String,
    }

    fn app() -> Router {
        Router::new()
            .route(
                "/items/{id}",
                get(|Path(id): Path<Uuid>| async move { id.to_string() }),
            )
            .route(
                "/items",
                get(|Query(q): Query<PageQuery>| async move { q.page.to_string() }),
            )
            .route(
                "/items/{id}/name",
                patch(|_: Path<Uuid>, Json(body): Json<RenameBody>| async move { body.name }),
            )
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_validation_envelope(value: &Value) {
        assert_eq!(value["_context"], "error");
        assert_eq!(value["type"], "ValidationError");
        assert_eq!(value["status_code"], 400);
        assert_eq!(value["error_code"], 4001);
        assert!(value["detail"].is_string());
    }

    #[tokio::test]
    async fn malformed_path_id_gets_the_envelope() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/items/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_validation_envelope(&body_json(response).await);
    }

    #[tokio::test]
    async fn unparsable_query_gets_the_envelope() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/items?page=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_validation_envelope(&body_json(response).await);
    }

    #[tokio::test]
    async fn invalid_json_body_gets_the_envelope() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .method("PATCH")
                    .uri(format!("/items/{}/name", Uuid::new_v4()))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_validation_envelope(&body_json(response).await);
    }

    #[tokio::test]
    async fn valid_input_passes_through() {
        let id = Uuid::new_v4();
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri(format!("/items/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, id.to_string().as_bytes());
    }
}
