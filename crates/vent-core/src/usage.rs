//! Quota evaluation.
//!
//! Paid plans are metered by session count against `session_limit`. Users without
//! an access-granting subscription fall back to a bounded trial, metered in seconds.

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

use crate::{Subscription, SubscriptionId, SubscriptionStatus, User};

/// Default trial allowance in seconds (10 minutes).
pub const DEFAULT_TRIAL_SECONDS: i64 = 600;

/// Trial policy applied when no subscription grants access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// Total trial seconds per user.
    pub trial_seconds: i64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            trial_seconds: DEFAULT_TRIAL_SECONDS,
        }
    }
}

/// Which meter a quota was evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaStatus {
    /// The trial meter.
    Trial,
    /// A subscription in the given status.
    Subscription(SubscriptionStatus),
}

impl QuotaStatus {
    /// Wire label: `trial` or the subscription status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Subscription(status) => status.as_str(),
        }
    }
}

impl Serialize for QuotaStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Result of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quota {
    /// Whether a new session may start.
    pub allowed: bool,

    /// Sessions left (paid) or seconds left (trial).
    pub remaining: i64,

    /// Meter the check was evaluated against.
    pub status: QuotaStatus,

    /// Subscription a new session would be charged to. `None` means the trial.
    #[serde(skip)]
    pub charge_to: Option<SubscriptionId>,
}

impl Quota {
    /// Evaluate the quota for a user.
    ///
    /// A subscription that grants access is authoritative even when exhausted; the
    /// trial only applies when there is none.
    #[must_use]
    pub fn evaluate(
        subscription: Option<&Subscription>,
        user: &User,
        policy: QuotaPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        if let Some(sub) = subscription.filter(|s| s.grants_access(now)) {
            let remaining = sub.remaining_sessions();
            return Self {
                allowed: remaining > 0,
                remaining,
                status: QuotaStatus::Subscription(sub.status),
                charge_to: Some(sub.id),
            };
        }

        let remaining = (policy.trial_seconds - user.trial_seconds_used).max(0);
        Self {
            allowed: remaining > 0,
            remaining,
            status: QuotaStatus::Trial,
            charge_to: None,
        }
    }

    /// How long a session started under this quota may run.
    ///
    /// Paid sessions run for `max_session`; trial sessions stop when the trial
    /// seconds left run out, if that comes first.
    #[must_use]
    pub fn session_limit(&self, max_session: Duration) -> Duration {
        if self.charge_to.is_some() {
            max_session
        } else {
            max_session.min(Duration::seconds(self.remaining))
        }
    }
}
