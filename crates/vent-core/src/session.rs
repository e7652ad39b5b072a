//! Real-time sessions.
//!
//! A session moves `NONE -> OPEN -> CLOSED`. The open state is a row with a null
//! `finished_at`; storage guarantees at most one such row per user.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{RoomId, SessionId, SubscriptionId, UserId};

/// One bounded call against a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID.
    pub id: SessionId,

    /// Owning user.
    pub user_id: UserId,

    /// Room the session runs in.
    pub room_id: RoomId,

    /// Subscription charged for the session. `None` means the trial meter.
    pub subscription_id: Option<SubscriptionId>,

    /// When the session was opened.
    pub started_at: DateTime<Utc>,

    /// Latest instant the session may run. Fixed at start from the maximum
    /// duration, or the trial seconds left if those run out sooner.
    pub deadline_at: DateTime<Utc>,

    /// When the session was closed, if it has been.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Running.
    Open,
    /// Ended, by the client or the reaper.
    Closed,
}

impl Session {
    /// Open a new session starting now that may run for at most `limit`.
    #[must_use]
    pub fn open(
        user_id: UserId,
        room_id: RoomId,
        subscription_id: Option<SubscriptionId>,
        limit: Duration,
    ) -> Self {
        let started_at = Utc::now();
        Self {
            id: SessionId::generate(),
            user_id,
            room_id,
            subscription_id,
            started_at,
            deadline_at: started_at + limit.max(Duration::zero()),
            finished_at: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.finished_at.is_some() {
            SessionState::Closed
        } else {
            SessionState::Open
        }
    }

    /// Whether the session is still open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.finished_at.is_none()
    }

    /// Whether the session has run past its deadline at `now`.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline_at <= now
    }

    /// `end` clamped to the session deadline.
    #[must_use]
    pub fn end_at(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        end.min(self.deadline_at)
    }

    /// Elapsed whole seconds between start and `end`, never past the deadline.
    #[must_use]
    pub fn elapsed_seconds(&self, end: DateTime<Utc>) -> i64 {
        (self.end_at(end) - self.started_at).num_seconds().max(0)
    }
}
