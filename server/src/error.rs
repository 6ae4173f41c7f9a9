//! Error types for the EventDesk server.
//!
//! Two layers of errors are defined here:
//!
//! - [`ServiceError`] - the domain taxonomy returned by the service layer
//!   (validation, authentication, authorization, absence, conflict, internal)
//! - [`ApiError`] - an HTTP-ready error carrying a status, an
//!   [`ErrorCode`] and a client-safe message
//!
//! Every controller converts service errors through the single
//! `From<ServiceError> for ApiError` mapping, so the status table is applied
//! identically across the API.
//!
//! # Example
//!
//! ```rust
//! use eventdesk_server::error::{ApiError, ServiceError};
//!
//! let err: ApiError = ServiceError::not_found("event not found").into();
//! assert_eq!(err.status().as_u16(), 404);
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::envelope::{Envelope, ErrorCode};
use crate::password::PasswordError;

/// Message returned to clients for every internal error.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Errors produced by the service layer.
///
/// The variant decides the HTTP status; the message is shown to the client
/// for every variant except [`ServiceError::Internal`], whose detail is only
/// logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed, missing or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing, invalid or expired credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller is authenticated but not entitled to the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or state conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns `true` if the error was caused by the client.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Specialized result type for service operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// An error ready to be rendered as an enveloped HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    /// Server-side detail for internal errors; never sent to clients.
    detail: Option<String>,
}

impl ApiError {
    /// Creates an error with the given code and client-facing message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Creates an internal error. `detail` is logged, the client only sees
    /// [`INTERNAL_ERROR_MESSAGE`].
    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: INTERNAL_ERROR_MESSAGE.to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::bad_request(msg),
            ServiceError::Unauthenticated(msg) => Self::unauthorized(msg),
            ServiceError::NotFound(msg) => Self::not_found(msg),
            ServiceError::Forbidden(msg) => Self::forbidden(msg),
            ServiceError::Conflict(msg) => Self::conflict(msg),
            ServiceError::Internal(detail) => Self::internal(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Runs inside the request span, so method and path are attached.
        if self.code == ErrorCode::InternalError {
            error!(
                status = self.status().as_u16(),
                error = self.detail.as_deref().unwrap_or(""),
                "Internal server error"
            );
        }

        (self.status(), Json(Envelope::error(self.code, self.message))).into_response()
    }
}

/// Result type returned by handlers.
pub type ApiResult<T> = std::result::Result<crate::envelope::ApiResponse<T>, ApiError>;
