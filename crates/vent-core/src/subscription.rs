//! Subscription lifecycle.
//!
//! A subscription is advanced only by validated billing events from the payment
//! gateway ([`Subscription::apply`]) and by scheduled sweeps
//! ([`Subscription::renew`], [`Subscription::expire_grace`]). Clients never mutate
//! status directly.
//!
//! ```text
//! created --activated/charged--> active --charge_failed--> past_due --charged--> active
//!    |                             |  ^                        |
//!    +--charge_failed--> failed    |  +------resumed------+    +--grace expired--> cancelled
//!                                  +--paused--> paused ---+
//! any non-terminal --cancelled--> cancelled (terminal)
//! ```

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Plan, PlanId, SubscriptionId, UserId};

// ============================================================================
// Status vocabulary
// ============================================================================

/// Version of the [`SubscriptionStatus`] vocabulary.
///
/// Bump together with a storage migration whenever a status is added.
pub const STATUS_VOCABULARY_VERSION: u32 = 1;

/// Status of a subscription (`payment_status` enum in storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created at the gateway, awaiting first payment.
    Created,
    /// Paid and in good standing.
    Active,
    /// A charge failed; access continues until the grace deadline.
    PastDue,
    /// Paused by the gateway or the user.
    Paused,
    /// Terminal.
    Cancelled,
    /// The initial charge failed.
    Failed,
    /// A value written by a newer deployment. Never transitions.
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// All statuses known to this vocabulary version, in storage order.
    pub const KNOWN: [Self; 6] = [
        Self::Created,
        Self::Active,
        Self::PastDue,
        Self::Paused,
        Self::Cancelled,
        Self::Failed,
    ];

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored value, falling back to `Unknown`.
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or(Self::Unknown)
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the subscription still blocks creating another one.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::PastDue | Self::Paused)
    }

    /// Whether the subscription was never paid for.
    #[must_use]
    pub const fn is_unpaid(self) -> bool {
        matches!(self, Self::Created | Self::Failed)
    }

    /// Rank used to pick a user's current subscription among several; lower wins.
    #[must_use]
    pub const fn standing(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::PastDue => 1,
            Self::Paused => 2,
            Self::Created => 3,
            Self::Failed | Self::Cancelled | Self::Unknown => 4,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::KNOWN
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A status label outside the known vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown subscription status: {0}")]
pub struct UnknownStatus(pub String);

// ============================================================================
// Billing events
// ============================================================================

/// Kind of a validated billing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventKind {
    /// The gateway activated the subscription.
    Activated,
    /// A charge succeeded.
    Charged,
    /// A charge failed.
    ChargeFailed,
    /// The subscription was paused.
    Paused,
    /// The subscription was resumed.
    Resumed,
    /// The subscription was cancelled.
    Cancelled,
}

impl BillingEventKind {
    /// Stable name used in logs and the processed-events table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Charged => "charged",
            Self::ChargeFailed => "charge_failed",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BillingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A billing event after signature verification and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingEvent {
    /// Gateway event ID, used for deduplication.
    pub event_id: String,

    /// What happened.
    pub kind: BillingEventKind,

    /// Subscription reference at the gateway.
    pub gateway_subscription_id: String,

    /// When the gateway says the event happened.
    pub occurred_at: DateTime<Utc>,

    /// Payment ID, for charge events.
    pub payment_id: Option<String>,

    /// Charged amount, for charge events.
    pub amount_cents: Option<i64>,

    /// Billing period start reported by the gateway.
    pub period_start: Option<DateTime<Utc>>,

    /// Billing period end reported by the gateway.
    pub period_end: Option<DateTime<Utc>>,
}

/// Outcome of applying a billing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The subscription changed and must be persisted.
    Applied {
        /// Status before.
        from: SubscriptionStatus,
        /// Status after.
        to: SubscriptionStatus,
    },
    /// The event is older than the last applied one.
    Stale {
        /// Timestamp of the last applied event.
        last_event_at: DateTime<Utc>,
    },
    /// The event does not apply in the current status.
    Ignored {
        /// Current status.
        status: SubscriptionStatus,
    },
}

impl Transition {
    /// Whether the subscription was mutated.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Outcome of a scheduled renewal check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// Nothing due yet, or the status does not renew.
    NotDue,
    /// Usage was reset and the billing window advanced.
    Renewed,
    /// A cancellation requested for period end took effect.
    Cancelled,
}

// ============================================================================
// Subscription
// ============================================================================

/// A user's subscription to a plan (a row of `payments`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: SubscriptionId,

    /// Owning user.
    pub user_id: UserId,

    /// Subscribed plan.
    pub plan_id: PlanId,

    /// Customer reference at the gateway.
    pub gateway_customer_id: Option<String>,

    /// Subscription reference at the gateway (unique).
    pub gateway_subscription_id: String,

    /// Current status.
    pub status: SubscriptionStatus,

    /// Sessions allowed per cycle, copied from the plan at creation.
    pub session_limit: i64,

    /// Sessions used in the current cycle.
    pub session_used: i64,

    /// Start of the current billing window.
    pub period_start: Option<DateTime<Utc>>,

    /// End of the current billing window.
    pub period_end: Option<DateTime<Utc>>,

    /// When the next cycle starts.
    pub next_billing_at: Option<DateTime<Utc>>,

    /// Deadline for a successful charge while past due.
    pub grace_period_ends_at: Option<DateTime<Utc>>,

    /// Cancel when the current period ends.
    pub cancel_at_period_end: bool,

    /// Last successful payment ID.
    pub last_payment_id: Option<String>,

    /// Last successful payment time.
    pub last_payment_at: Option<DateTime<Utc>>,

    /// Last successful payment amount.
    pub last_payment_amount_cents: Option<i64>,

    /// Gateway timestamp of the last applied event.
    pub last_event_at: Option<DateTime<Utc>>,

    /// Optimistic concurrency version, bumped by the store on every write.
    pub version: i64,

    /// When the subscription was created.
    pub created_at: DateTime<Utc>,

    /// When the subscription was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a subscription awaiting its first payment.
    #[must_use]
    pub fn new(
        user_id: UserId,
        plan: &Plan,
        gateway_customer_id: Option<String>,
        gateway_subscription_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SubscriptionId::generate(),
            user_id,
            plan_id: plan.id,
            gateway_customer_id,
            gateway_subscription_id,
            status: SubscriptionStatus::Created,
            session_limit: plan.session_limit,
            session_used: 0,
            period_start: None,
            period_end: None,
            next_billing_at: None,
            grace_period_ends_at: None,
            cancel_at_period_end: false,
            last_payment_id: None,
            last_payment_at: None,
            last_payment_amount_cents: None,
            last_event_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the subscription entitles the user to its allowance at `now`.
    #[must_use]
    pub fn grants_access(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SubscriptionStatus::Active => true,
            SubscriptionStatus::PastDue => self.grace_period_ends_at.is_some_and(|end| end > now),
            _ => false,
        }
    }

    /// Sessions left in the current cycle.
    #[must_use]
    pub fn remaining_sessions(&self) -> i64 {
        (self.session_limit - self.session_used).max(0)
    }

    /// Apply a billing event.
    ///
    /// Events older than the last applied one are reported as stale and leave the
    /// subscription untouched. Deduplication by event ID happens in the store.
    pub fn apply(&mut self, event: &BillingEvent, grace: Duration) -> Transition {
        use BillingEventKind as K;
        use SubscriptionStatus as S;

        if let Some(last_event_at) = self.last_event_at {
            if event.occurred_at < last_event_at {
                return Transition::Stale { last_event_at };
            }
        }

        let from = self.status;
        let to = match (from, event.kind) {
            (S::Created | S::Failed, K::Activated | K::Charged)
            | (S::PastDue | S::Active, K::Charged)
            | (S::Paused, K::Resumed) => S::Active,
            (S::Active, K::ChargeFailed) => S::PastDue,
            (S::Created, K::ChargeFailed) => S::Failed,
            (S::Active, K::Paused) => S::Paused,
            (S::Created | S::Active | S::PastDue | S::Paused | S::Failed, K::Cancelled) => {
                S::Cancelled
            }
            _ => return Transition::Ignored { status: from },
        };

        match (to, event.kind) {
            (S::Active, K::Charged) => {
                self.record_payment(event);
                self.grace_period_ends_at = None;
            }
            (S::Active, _) => self.grace_period_ends_at = None,
            (S::PastDue, _) => self.grace_period_ends_at = Some(event.occurred_at + grace),
            _ => {}
        }

        if to == S::Active {
            self.adopt_period(event);
        }

        self.status = to;
        self.last_event_at = Some(event.occurred_at);
        self.updated_at = Utc::now();
        Transition::Applied { from, to }
    }

    /// Scheduled monthly reset.
    ///
    /// When `next_billing_at` has passed, a pending end-of-period cancellation takes
    /// effect; otherwise an active subscription has its usage zeroed and its window
    /// advanced past `now`.
    pub fn renew(&mut self, now: DateTime<Utc>) -> Renewal {
        let Some(due) = self.next_billing_at.filter(|due| *due <= now) else {
            return Renewal::NotDue;
        };

        if self.cancel_at_period_end && !self.status.is_terminal() {
            self.status = SubscriptionStatus::Cancelled;
            self.grace_period_ends_at = None;
            self.updated_at = now;
            return Renewal::Cancelled;
        }

        if self.status != SubscriptionStatus::Active {
            return Renewal::NotDue;
        }

        let mut start = due;
        let mut end = add_month(due);
        while end <= now {
            start = end;
            end = add_month(end);
        }

        self.session_used = 0;
        self.period_start = Some(start);
        self.period_end = Some(end);
        self.next_billing_at = Some(end);
        self.updated_at = now;
        Renewal::Renewed
    }

    /// Cancel immediately. Returns `true` when the subscription changed.
    pub fn cancel_now(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SubscriptionStatus::Cancelled;
        self.grace_period_ends_at = None;
        self.cancel_at_period_end = false;
        self.updated_at = now;
        true
    }

    /// Cancel a past-due subscription whose grace period elapsed.
    ///
    /// Returns `true` when the subscription changed.
    pub fn expire_grace(&mut self, now: DateTime<Utc>) -> bool {
        let expired = self.status == SubscriptionStatus::PastDue
            && self.grace_period_ends_at.is_some_and(|end| end <= now);
        if expired {
            self.status = SubscriptionStatus::Cancelled;
            self.grace_period_ends_at = None;
            self.updated_at = now;
        }
        expired
    }

    fn record_payment(&mut self, event: &BillingEvent) {
        self.last_payment_at = Some(event.occurred_at);
        if event.payment_id.is_some() {
            self.last_payment_id.clone_from(&event.payment_id);
        }
        if event.amount_cents.is_some() {
            self.last_payment_amount_cents = event.amount_cents;
        }
    }

    /// Take the gateway's billing window, starting a fresh cycle when it moved forward.
    fn adopt_period(&mut self, event: &BillingEvent) {
        let start = event
            .period_start
            .or(self.period_start)
            .unwrap_or(event.occurred_at);
        let end = event.period_end.unwrap_or_else(|| add_month(start));

        let new_cycle = self.period_start.map_or(true, |current| start > current);
        if !new_cycle {
            return;
        }
        self.session_used = 0;
        self.period_start = Some(start);
        self.period_end = Some(end);
        self.next_billing_at = Some(end);
    }
}

/// Advance by one calendar month, clamping to the month's last day.
fn add_month(at: DateTime<Utc>) -> DateTime<Utc> {
    at.checked_add_months(Months::new(1))
        .unwrap_or_else(|| at + Duration::days(30))
}
