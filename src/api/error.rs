//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::TaskError;

/// Error returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The submitted secret does not match.
    Forbidden,
    /// The request is well-formed JSON but its values are unusable.
    Validation(String),
    /// Processing the task failed.
    Task(TaskError),
    /// The task runner itself failed (panicked or was aborted).
    Internal(String),
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        ApiError::Task(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Task(TaskError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Task(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Forbidden => "Invalid secret".to_string(),
            ApiError::Validation(msg) => msg.clone(),
            ApiError::Task(e) => e.to_string(),
            ApiError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), %detail, "Task failed");
        } else {
            tracing::warn!(status = status.as_u16(), %detail, "Request rejected");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
