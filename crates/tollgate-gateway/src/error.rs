//! API error types and responses.
//!
//! This module defines the outcome codes every call is classified under and
//! the standard error body for all API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use tollgate_auth::AuthError;
use tollgate_broker::BrokerError;

/// Outcome code of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// The call succeeded.
    Ok,
    /// The request was malformed.
    InvalidArgument,
    /// The caller presented no valid credential.
    Unauthenticated,
    /// The caller is authenticated but not allowed.
    PermissionDenied,
    /// The target does not exist.
    NotFound,
    /// The caller's rate limit is exhausted.
    ResourceExhausted,
    /// A backing service is unavailable.
    Unavailable,
    /// Anything else.
    Internal,
}

impl Code {
    /// The wire name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArgument => "invalid_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }

    /// The HTTP status a failure with this code is returned with.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify a response that carries no [`CallOutcome`], such as a
    /// framework rejection.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            s if s.is_success() || s.is_informational() || s.is_redirection() => Self::Ok,
            StatusCode::UNAUTHORIZED => Self::Unauthenticated,
            StatusCode::FORBIDDEN => Self::PermissionDenied,
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => Self::NotFound,
            StatusCode::TOO_MANY_REQUESTS => Self::ResourceExhausted,
            StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::BAD_GATEWAY
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::REQUEST_TIMEOUT => Self::Unavailable,
            s if s.is_client_error() => Self::InvalidArgument,
            _ => Self::Internal,
        }
    }
}

/// The failure an error response was built from.
///
/// Attached to the response extensions so outer layers can record it
/// without parsing the body.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// The outcome code.
    pub code: Code,
    /// The error message.
    pub message: String,
}

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credential.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller lacks a required role.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Too many requests, rate limit exceeded.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Invalid request body or parameters.
    #[error("invalid argument: {0}")]
    BadRequest(String),

    /// A backing service is unavailable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the outcome code for this error.
    #[must_use]
    pub const fn code(&self) -> Code {
        match self {
            Self::Unauthenticated(_) => Code::Unauthenticated,
            Self::PermissionDenied(_) => Code::PermissionDenied,
            Self::NotFound(_) => Code::NotFound,
            Self::RateLimited => Code::ResourceExhausted,
            Self::BadRequest(_) => Code::InvalidArgument,
            Self::Unavailable(_) => Code::Unavailable,
            Self::Internal(_) => Code::Internal,
        }
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.code().status_code()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.as_str(),
                message: message.clone(),
            },
        };

        let mut response = (code.status_code(), Json(body)).into_response();
        response
            .extensions_mut()
            .insert(CallOutcome { code, message });
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_unauthenticated() {
            return Self::Unauthenticated(err.to_string());
        }
        tracing::error!(error = %err, "Credential service misconfigured");
        Self::Internal("authentication service error".to_string())
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Unavailable(ref store_err) => {
                tracing::error!(error = %store_err, "Broker unavailable");
                Self::Unavailable("notification broker unavailable".to_string())
            }
            BrokerError::GroupNotFound { .. } => Self::NotFound(err.to_string()),
            BrokerError::InvalidRequest(msg) | BrokerError::MalformedNotification(msg) => {
                Self::BadRequest(msg)
            }
        }
    }
}
