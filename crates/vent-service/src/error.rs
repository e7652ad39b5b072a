//! API error types and responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use vent_core::VentError;
use vent_store::StoreError;

/// Seconds a client should wait before retrying a 503.
const RETRY_AFTER_SECONDS: &str = "1";

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No quota left for a new session.
    #[error("quota exceeded: remaining={remaining}, status={status}")]
    QuotaExceeded {
        /// Remaining allowance.
        remaining: i64,
        /// Meter the quota was evaluated against.
        status: String,
    },

    /// A dependency is temporarily unavailable; retry later.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::QuotaExceeded { remaining, status } => (
                StatusCode::FORBIDDEN,
                "quota_exceeded",
                "No sessions left on the current plan".to_string(),
                Some(serde_json::json!({
                    "remaining": remaining,
                    "status": status
                })),
            ),
            Self::Unavailable(msg) => {
                tracing::warn!(error = %msg, "Dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "Service temporarily unavailable, retry shortly".to_string(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RETRY_AFTER_SECONDS),
            );
        }
        response
    }
}

impl From<VentError> for ApiError {
    fn from(err: VentError) -> Self {
        match err {
            VentError::QuotaExceeded { remaining, status } => {
                Self::QuotaExceeded { remaining, status }
            }
            VentError::AlreadyActive { session } => {
                Self::Conflict(format!("session already active: {session}"))
            }
            VentError::SessionNotFound(id) => Self::NotFound(format!("session not found: {id}")),
            VentError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            VentError::Conflict(msg) => Self::Conflict(msg),
            VentError::Unavailable(msg) => Self::Unavailable(msg),
            VentError::ExternalService { service, message } => {
                Self::ExternalService(format!("{service}: {message}"))
            }
            VentError::InvalidId(e) => Self::BadRequest(e.to_string()),
            VentError::Storage(msg) | VentError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        VentError::from(err).into()
    }
}
