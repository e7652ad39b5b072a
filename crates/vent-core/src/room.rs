//! Rooms.
//!
//! Every user owns exactly one durable room. Its name is the identifier handed to
//! the real-time media server. The `condition` flag is a display projection kept in
//! step with session transitions; it is never consulted for concurrency control.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{RoomId, UserId};

/// A user's durable media room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room ID.
    pub id: RoomId,

    /// Owning user (unique).
    pub user_id: UserId,

    /// Media-server room name (unique).
    pub room_name: String,

    /// Whether a session is currently running in the room.
    pub condition: RoomCondition,

    /// When the room was created.
    pub created_at: DateTime<Utc>,

    /// When the room was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// Create a new room for a user, switched off.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: RoomId::generate(),
            user_id,
            room_name: Self::name_for(&user_id),
            condition: RoomCondition::Off,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic room name for a user.
    ///
    /// Deterministic naming means two racing creators produce the same name, so the
    /// loser trips the per-user uniqueness constraint rather than leaving a stray room.
    #[must_use]
    pub fn name_for(user_id: &UserId) -> String {
        format!("room_{user_id}")
    }
}

/// Room condition vocabulary (`room_condition` enum in storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomCondition {
    /// A session is open in the room.
    On,
    /// No session is open.
    Off,
}

impl RoomCondition {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for RoomCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomCondition {
    type Err = crate::VentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(crate::VentError::Internal(format!(
                "unknown room condition: {other}"
            ))),
        }
    }
}
