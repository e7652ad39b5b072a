//! Client error types.

/// Errors that can occur when using the vent client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing, invalid or expired access token. Re-authenticate.
    #[error("unauthorized")]
    Unauthorized,

    /// No sessions left on the current plan.
    #[error("quota exceeded: remaining={remaining}, status={status}")]
    QuotaExceeded {
        /// Remaining allowance.
        remaining: i64,
        /// Meter the quota was evaluated against.
        status: String,
    },

    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend stayed unreachable or unavailable through every retry.
    #[error("server offline after {attempts} attempts")]
    ServerOffline {
        /// Attempts made.
        attempts: u32,
    },

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether the caller should send the user back to sign-in.
    #[must_use]
    pub const fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
