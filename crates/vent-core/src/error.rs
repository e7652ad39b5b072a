//! Error types for vent.

use crate::ids::IdError;
use crate::SessionId;

/// Result type for vent operations.
pub type Result<T> = std::result::Result<T, VentError>;

/// Errors that can occur in vent operations.
///
/// The variants form the user-facing taxonomy: quota and conflict errors need user
/// action, `Unavailable` is retryable, `Internal` hides a logic bug.
#[derive(Debug, thiserror::Error)]
pub enum VentError {
    /// The user has no quota left for a new session.
    #[error("quota exceeded: remaining={remaining}, status={status}")]
    QuotaExceeded {
        /// Remaining allowance (sessions or trial seconds).
        remaining: i64,
        /// Billing status the quota was evaluated against.
        status: String,
    },

    /// The user already has an open session.
    #[error("session already active: {session}")]
    AlreadyActive {
        /// The open session.
        session: SessionId,
    },

    /// Session not found, or not owned by the caller.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Generic not-found for other entities.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity kind.
        entity: &'static str,
        /// The identifier looked up.
        id: String,
    },

    /// Conflicting state that is not an expected race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A dependency (database, media server, gateway) is temporarily unreachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// External service error (payment gateway).
    #[error("external service error: {service} - {message}")]
    ExternalService {
        /// The service that failed.
        service: String,
        /// Error message.
        message: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Unexpected internal condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VentError {
    /// Whether a caller may retry the operation after backing off.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
