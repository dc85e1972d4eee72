//! Crate-wide error taxonomy.
//!
//! `NotFound`, `Gone` and `AlreadyExists` are expected outcomes that the HTTP
//! layer turns into status codes. `Unavailable`, `Timeout` and `Internal` are
//! real failures and are never retried inside the core.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
    details: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, details: Value },

    /// The token was never issued.
    #[error("{message}")]
    NotFound { message: String, details: Value },

    /// The token existed and has been tombstoned.
    #[error("{message}")]
    Gone { message: String, details: Value },

    /// The URL is already bound to an active record; `token` is the existing one.
    #[error("URL already exists with token {token}")]
    AlreadyExists { token: String, url: String },

    #[error("{message}")]
    Conflict { message: String, details: Value },

    #[error("failed to find a free token after {attempts} attempts")]
    TokenSpaceExhausted { attempts: usize },

    /// Storage unreachable, queue full, or pipeline stopped.
    #[error("{message}")]
    Unavailable { message: String, details: Value },

    #[error("operation exceeded its {timeout_ms}ms deadline")]
    Timeout { timeout_ms: u64 },

    #[error("{message}")]
    Internal { message: String, details: Value },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }
    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }
    pub fn gone(message: impl Into<String>, details: Value) -> Self {
        Self::Gone {
            message: message.into(),
            details,
        }
    }
    pub fn already_exists(token: impl Into<String>, url: impl Into<String>) -> Self {
        Self::AlreadyExists {
            token: token.into(),
            url: url.into(),
        }
    }
    pub fn conflict(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }
    pub fn unavailable(message: impl Into<String>, details: Value) -> Self {
        Self::Unavailable {
            message: message.into(),
            details,
        }
    }
    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }

    /// Returns true for outcomes the caller expects and maps to a status code,
    /// as opposed to failures worth logging.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Gone { .. }
                | Self::AlreadyExists { .. }
                | Self::Validation { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Gone { .. } => StatusCode::GONE,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::TokenSpaceExhausted { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Gone { .. } => "gone",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Conflict { .. } => "conflict",
            Self::TokenSpaceExhausted { .. } => "token_space_exhausted",
            Self::Unavailable { .. } => "unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal_error",
        }
    }

    fn details(&self) -> Value {
        match self {
            Self::Validation { details, .. }
            | Self::NotFound { details, .. }
            | Self::Gone { details, .. }
            | Self::Conflict { details, .. }
            | Self::Unavailable { details, .. }
            | Self::Internal { details, .. } => details.clone(),
            Self::AlreadyExists { token, url } => json!({ "token": token, "url": url }),
            Self::TokenSpaceExhausted { attempts } => json!({ "attempts": attempts }),
            Self::Timeout { timeout_ms } => json!({ "timeout_ms": timeout_ms }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorInfo {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::unavailable("Database unavailable", json!({ "reason": e.to_string() }))
            }
            other => AppError::internal("Database error", json!({ "reason": other.to_string() })),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::internal("I/O error", json!({ "reason": e.to_string() }))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::internal("Serialization error", json!({ "reason": e.to_string() }))
    }
}
