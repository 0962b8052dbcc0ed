//! API error envelope.
//!
//! Every error leaves the service in the same JSON shape:
//! `{"_context": "error", "type": ..., "status_code": ..., "error_code": ...,
//! "detail": ...}`. Each error kind carries a stable numeric code so clients
//! can branch without string matching. Internal failures are logged with
//! their real cause and surfaced with a generic detail.

use crate::services::cloud_file_service::ServiceError;
use crate::storage::StorageError;
use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Lock(String),
    #[error("{0}")]
    UnsupportedBackend(String),
    #[error("{0}")]
    Upload(String),
    #[error("{0}")]
    Unexpected(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "ValidationError",
            ApiError::NotFound(_) => "NotFound",
            ApiError::PermissionDenied(_) => "PermissionDenied",
            ApiError::Lock(_) => "LockError",
            ApiError::UnsupportedBackend(_) => "UnsupportedBackend",
            ApiError::Upload(_) => "UploadError",
            ApiError::Unexpected(_) => "UnexpectedError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::Lock(_) => StatusCode::LOCKED,
            ApiError::UnsupportedBackend(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Upload(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 4001,
            ApiError::NotFound(_) => 4041,
            ApiError::PermissionDenied(_) => 4031,
            ApiError::Lock(_) => 4231,
            ApiError::UnsupportedBackend(_) => 5011,
            ApiError::Upload(_) => 5031,
            ApiError::Unexpected(_) => 5001,
        }
    }

    fn detail(&self) -> String {
        match self {
            // The real cause goes to the log, not the client.
            ApiError::Unexpected(_) => "An unexpected error occurred.".to_string(),
            other => other.to_string(),
        }
    }

    pub fn envelope(&self) -> serde_json::Value {
        json!({
            "_context": "error",
            "type": self.kind(),
            "status_code": self.status().as_u16(),
            "error_code": self.error_code(),
            "detail": self.detail(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "request rejected");
        }
        (status, Json(self.envelope())).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::FileNotFound(_) | ServiceError::ContentNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            ServiceError::UnknownTarget(_)
            | ServiceError::InvalidTarget(_)
            | ServiceError::Invalid(_) => ApiError::Validation(err.to_string()),
            ServiceError::Forbidden => ApiError::PermissionDenied(err.to_string()),
            ServiceError::LockHeld(_) => ApiError::Lock(err.to_string()),
            ServiceError::UnsupportedBackend(_) => ApiError::UnsupportedBackend(err.to_string()),
            ServiceError::Storage(StorageError::NotFound(key)) => {
                ApiError::NotFound(format!("object `{key}` not found in backend"))
            }
            ServiceError::Storage(storage) => ApiError::Upload(storage.to_string()),
            ServiceError::Sqlx(inner) => ApiError::Unexpected(inner.to_string()),
            ServiceError::Json(inner) => ApiError::Unexpected(inner.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Validation(format!("invalid multipart body: {err}"))
    }
}

impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        ApiError::Validation(format!("invalid path parameter: {err}"))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::Validation(format!("invalid query string: {err}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::Validation(format!("invalid request body: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape_is_stable() {
        let envelope = ApiError::Validation("missing `file` part".into()).envelope();
        assert_eq!(envelope["_context"], "error");
        assert_eq!(envelope["type"], "ValidationError");
        assert_eq!(envelope["status_code"], 400);
        assert_eq!(envelope["error_code"], 4001);
        assert_eq!(envelope["detail"], "missing `file` part");
    }

    #[test]
    fn lock_errors_map_to_423() {
        let err = ApiError::Lock("cannot acquire the lock".into());
        assert_eq!(err.status(), StatusCode::LOCKED);
        assert_eq!(err.error_code(), 4231);
    }

    #[test]
    fn unexpected_errors_hide_their_cause() {
        let envelope = ApiError::Unexpected("connection pool exhausted".into()).envelope();
        assert_eq!(envelope["detail"], "An unexpected error occurred.");
        assert_eq!(envelope["error_code"], 5001);
    }

    #[test]
    fn service_errors_map_to_api_kinds() {
        let err: ApiError =
            ApiError::from(ServiceError::FileNotFound(uuid::Uuid::new_v4()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = ApiError::from(ServiceError::UnsupportedBackend("gcs".into()));
        assert_eq!(err.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(err.error_code(), 5011);

        let err: ApiError = ApiError::from(ServiceError::Storage(StorageError::Upload(
            "timeout".into(),
        )));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
