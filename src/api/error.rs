//! JSON error envelope for the mock REST backend.
//!
//! All errors are returned as `{"error": {"code", "message", "details"?}}`
//! with a status code matching the error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    ValidationError,
    InternalError,
    StorageError,
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// The inner error object in the response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    /// Field-level validation messages, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };

        (self.code.status_code(), Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::Validation(errors) => Self {
                code: ErrorCode::ValidationError,
                message: err.to_string(),
                details: serde_json::to_value(errors).ok(),
            },
            Error::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                ApiError::new(ErrorCode::StorageError, "A storage error occurred")
            }
            Error::Service(msg) => ApiError::new(ErrorCode::ServiceUnavailable, msg.clone()),
            Error::NotFound(_) => ApiError::new(ErrorCode::NotFound, err.to_string()),
            Error::Conflict(_) => ApiError::new(ErrorCode::Conflict, err.to_string()),
            Error::Unauthorized(msg) => ApiError::unauthorized(msg.clone()),
        }
    }
}

/// Rebuild a library error from a response envelope
impl From<ErrorBody> for Error {
    fn from(body: ErrorBody) -> Self {
        match body.code {
            ErrorCode::ValidationError => body
                .details
                .and_then(|d| serde_json::from_value(d).ok())
                .map(Error::Validation)
                .unwrap_or(Error::Service(body.message)),
            ErrorCode::Unauthorized => Error::Unauthorized(body.message),
            ErrorCode::NotFound => Error::NotFound(body.message),
            ErrorCode::Conflict => Error::Conflict(body.message),
            _ => Error::Service(body.message),
        }
    }
}
