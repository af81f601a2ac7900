//! Error responses of the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::error::IntakeError;
use crate::scheduler::QueueError;

use super::responses::ErrorBody;

/// Errors returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The `url` form field is missing.
    #[error("url field is required")]
    MissingUrl,

    /// The submitted URL is not a pull-request URL.
    #[error(transparent)]
    Intake(#[from] IntakeError),

    /// A task query is neither a numeric ID nor an identifier.
    #[error("invalid task query '{0}'")]
    InvalidQuery(String),

    /// No task matches the query.
    #[error("task not found")]
    NotFound,

    /// The queue refused the task.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    ///
    /// - Bad input: 400 Bad Request
    /// - Unknown task: 404 Not Found
    /// - Queue full or closed: 503 Service Unavailable
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingUrl | Self::Intake(_) | Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Queue(QueueError::AlreadyQueued(_)) => StatusCode::CONFLICT,
            Self::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request refused");
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::MissingUrl.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Intake(IntakeError::NotPullRequestUrl("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidQuery("abc".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Queue(QueueError::Full { capacity: 1 }).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Queue(QueueError::Closed).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_intake_message_passes_through() {
        let err = ApiError::from(IntakeError::NotPullRequestUrl("http://x".into()));
        assert_eq!(
            err.to_string(),
            "URL doesn't seem like Stash pull request: http://x"
        );
    }
}
