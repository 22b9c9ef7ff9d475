//! HTTP error responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use newsdesk_queue::QueueError;
use serde_json::json;

/// Error type for HTTP handlers.
///
/// Every variant renders as `{"error": "..."}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A queue operation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The request body could not be read.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Queue(QueueError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Queue(QueueError::JobNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Job not found".to_string())
            }
            Self::Queue(QueueError::BrokerUnavailable(msg)) => {
                tracing::error!(error = %msg, "Queue unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Queue unavailable".to_string(),
                )
            }
            Self::Queue(other) => {
                tracing::error!(error = %other, "Queue error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}
