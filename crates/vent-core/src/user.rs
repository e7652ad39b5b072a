//! User records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Display name given to users created before they finish onboarding.
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// A user known to the service.
///
/// The identifier is owned by the identity provider; the row is created on first
/// authenticated use and never deleted by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user ID (bearer token `sub`).
    pub id: UserId,

    /// Display name.
    pub name: String,

    /// Age, if the user provided one.
    pub age: Option<i32>,

    /// Onboarding progress.
    pub onboarding: Onboarding,

    /// Trial seconds consumed so far.
    pub trial_seconds_used: i64,

    /// When the user was created.
    pub created_at: DateTime<Utc>,

    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a fresh user with default profile fields.
    #[must_use]
    pub fn new(id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: DEFAULT_DISPLAY_NAME.to_string(),
            age: None,
            onboarding: Onboarding::Pending,
            trial_seconds_used: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Onboarding progress of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Onboarding {
    /// Profile setup not yet completed.
    Pending,
    /// Profile setup completed.
    Done,
}

impl Onboarding {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
        }
    }

    /// Parse the storage representation, defaulting to `Pending`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("done") {
            Self::Done
        } else {
            Self::Pending
        }
    }
}
