// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // 500 Internal Server Error (store failures)
    InternalServerError(String),

    // 400 Bad Request (missing or blank required input)
    BadRequest(String),

    // 401 Unauthorized (missing or invalid identity)
    AuthError(String),

    // 403 Forbidden (actor neither owns the room nor holds an elevated role)
    Forbidden(String),

    // 404 Not Found (room absent, category without questions or answer keys)
    NotFound(String),

    // 409 Conflict (illegal lifecycle transition, strict cutoff)
    Conflict(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::InternalServerError(msg)
            | AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.message().to_string(),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Failure of one of the two participant-facing exam endpoints.
///
/// Those endpoints report every failure as `500 { "error": <message> }`, which is
/// the contract existing exam clients are written against.
#[derive(Debug)]
pub struct ExamFailure(pub AppError);

impl From<AppError> for ExamFailure {
    fn from(err: AppError) -> Self {
        ExamFailure(err)
    }
}

impl IntoResponse for ExamFailure {
    fn into_response(self) -> Response {
        match &self.0 {
            AppError::InternalServerError(msg) => tracing::error!("Exam request failed: {}", msg),
            other => tracing::warn!("Exam request rejected: {}", other),
        }
        let body = Json(json!({
            "error": self.0.message(),
        }));

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}
