use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use beacon_content::ContentError;
use beacon_db::StoreError;
use beacon_federation::FederationError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Federation(#[from] FederationError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Store(e) => match e {
                StoreError::Conflict(_) => StatusCode::CONFLICT,
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::BadRequest(_) | StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
                StoreError::Sqlite(_) | StoreError::Json(_) | StoreError::LockPoisoned => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Content(e) => match e {
                ContentError::NotApplicable(_) => StatusCode::CONFLICT,
                ContentError::Io(_) | ContentError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            Self::Federation(FederationError::InvalidDestination { .. }) => StatusCode::BAD_REQUEST,
            Self::Federation(_) | Self::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Message shown to the caller. Server errors hide their detail.
    fn user_message(&self) -> String {
        match self {
            Self::Federation(e) if !matches!(e, FederationError::InvalidDestination { .. }) => {
                "federation enqueue failed".into()
            }
            _ if self.status_code().is_server_error() => "internal server error".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {self}");
        } else {
            warn!(status = status.as_u16(), "request rejected: {self}");
        }

        let body = json!({
            "error": self.user_message(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_distinct_statuses() {
        let cases = [
            (StoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (StoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (StoreError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (StoreError::Invalid("x".into()), StatusCode::BAD_REQUEST),
            (StoreError::LockPoisoned, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn server_errors_hide_detail() {
        let err = ApiError::from(StoreError::LockPoisoned);
        assert_eq!(err.user_message(), "internal server error");

        let err = ApiError::from(FederationError::Enqueue("db gone".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "federation enqueue failed");
    }
}
