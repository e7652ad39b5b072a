//! Usage meter.
//!
//! Read-side quota checks and the usage charge applied when a session closes.
//! The charge itself is written atomically by the store as part of the close.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use vent_core::{Quota, QuotaPolicy, QuotaStatus, Session, Subscription, User, UserId, VentError};
use vent_store::{Store, UsageCharge};

use crate::deadline::bounded;

/// Unit of a usage meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageUnit {
    /// Paid plans count sessions.
    Sessions,
    /// The trial counts seconds.
    Seconds,
}

/// Usage status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    /// Allowance of the active meter.
    pub session_limit: i64,
    /// Consumption against the allowance.
    pub session_used: i64,
    /// What is left.
    pub remaining: i64,
    /// Meter the numbers belong to (`trial` or a subscription status).
    pub status: QuotaStatus,
    /// Unit of the numbers.
    pub unit: UsageUnit,
    /// Start of the next billing cycle.
    pub next_billing_at: Option<DateTime<Utc>>,
    /// Deadline for a successful charge while past due.
    pub grace_period_ends_at: Option<DateTime<Utc>>,
    /// Whether the subscription ends with the current cycle.
    pub cancel_at_period_end: bool,
    /// Status of the current subscription, even when it no longer grants access.
    pub subscription_status: Option<String>,
}

/// Evaluates quotas and usage charges.
#[derive(Clone)]
pub struct UsageMeter {
    store: Arc<dyn Store>,
    timeout: Duration,
    policy: QuotaPolicy,
    max_session: chrono::Duration,
}

impl UsageMeter {
    /// Create a meter.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        timeout: Duration,
        policy: QuotaPolicy,
        max_session: chrono::Duration,
    ) -> Self {
        Self {
            store,
            timeout,
            policy,
            max_session,
        }
    }

    /// Check whether the user may start a session. Read-only.
    pub async fn check_quota(&self, user_id: UserId) -> Result<Quota, VentError> {
        let (user, subscription) = self.load(user_id).await?;
        Ok(Quota::evaluate(
            subscription.as_ref(),
            &user,
            self.policy,
            Utc::now(),
        ))
    }

    /// How long a session started under `quota` may run.
    #[must_use]
    pub fn session_limit(&self, quota: &Quota) -> chrono::Duration {
        quota.session_limit(self.max_session)
    }

    /// Usage to charge when `session` closes at `end`.
    ///
    /// Paid sessions count one each; trial sessions charge their elapsed seconds,
    /// which never run past the trial left when the session started.
    #[must_use]
    pub fn usage_charge(session: &Session, end: DateTime<Utc>) -> UsageCharge {
        match session.subscription_id {
            Some(subscription_id) => UsageCharge::Sessions {
                subscription_id,
                count: 1,
            },
            None => UsageCharge::TrialSeconds {
                seconds: session.elapsed_seconds(end),
            },
        }
    }

    /// Usage status for display.
    pub async fn usage_summary(&self, user_id: UserId) -> Result<UsageSummary, VentError> {
        let (user, subscription) = self.load(user_id).await?;
        let quota = Quota::evaluate(subscription.as_ref(), &user, self.policy, Utc::now());
        let subscription_status = subscription.as_ref().map(|s| s.status.to_string());

        let summary = match subscription.filter(|_| quota.charge_to.is_some()) {
            Some(sub) => UsageSummary {
                session_limit: sub.session_limit,
                session_used: sub.session_used,
                remaining: quota.remaining,
                status: quota.status,
                unit: UsageUnit::Sessions,
                next_billing_at: sub.next_billing_at,
                grace_period_ends_at: sub.grace_period_ends_at,
                cancel_at_period_end: sub.cancel_at_period_end,
                subscription_status,
            },
            None => UsageSummary {
                session_limit: self.policy.trial_seconds,
                session_used: user.trial_seconds_used,
                remaining: quota.remaining,
                status: quota.status,
                unit: UsageUnit::Seconds,
                next_billing_at: None,
                grace_period_ends_at: None,
                cancel_at_period_end: false,
                subscription_status,
            },
        };
        Ok(summary)
    }

    async fn load(&self, user_id: UserId) -> Result<(User, Option<Subscription>), VentError> {
        let (user, subscription) = tokio::try_join!(
            bounded(self.timeout, self.store.get_user(&user_id)),
            bounded(self.timeout, self.store.get_current_subscription(&user_id)),
        )?;
        // Users are created on first use; until then they have an untouched trial.
        Ok((user.unwrap_or_else(|| User::new(user_id)), subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vent_core::{Plan, PlanId, RoomId, SubscriptionStatus};
    use vent_store::MemoryStore;

    fn meter(store: Arc<MemoryStore>) -> UsageMeter {
        UsageMeter::new(
            store,
            Duration::from_secs(1),
            QuotaPolicy { trial_seconds: 600 },
            chrono::Duration::hours(2),
        )
    }

    async fn subscribe(store: &MemoryStore, user_id: UserId, limit: i64, used: i64) -> Subscription {
        let plan = Plan {
            id: PlanId::generate(),
            name: "Monthly".into(),
            price_cents: 49900,
            session_limit: limit,
            gateway_plan_id: format!("plan_{limit}_{used}"),
        };
        store.upsert_plan(&plan).await.unwrap();
        let mut sub = Subscription::new(user_id, &plan, None, format!("sub_{}", user_id));
        sub.status = SubscriptionStatus::Active;
        sub.session_used = used;
        store.insert_subscription(&sub).await.unwrap();
        sub
    }

    #[tokio::test]
    async fn unknown_user_gets_full_trial() {
        let meter = meter(Arc::new(MemoryStore::new()));
        let quota = meter.check_quota(UserId::generate()).await.unwrap();
        assert!(quota.allowed);
        assert_eq!(quota.remaining, 600);
        assert_eq!(quota.status, QuotaStatus::Trial);
    }

    #[tokio::test]
    async fn exhausted_plan_denies() {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        subscribe(&store, user_id, 10, 10).await;

        let quota = meter(store).check_quota(user_id).await.unwrap();
        assert!(!quota.allowed);
        assert_eq!(quota.remaining, 0);
    }

    #[tokio::test]
    async fn summary_reports_subscription_meter() {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        subscribe(&store, user_id, 5, 2).await;

        let summary = meter(store).usage_summary(user_id).await.unwrap();
        assert_eq!(summary.session_limit, 5);
        assert_eq!(summary.session_used, 2);
        assert_eq!(summary.remaining, 3);
        assert_eq!(summary.unit, UsageUnit::Sessions);
        assert_eq!(summary.subscription_status.as_deref(), Some("active"));
    }

    #[tokio::test]
    async fn paid_subscription_is_not_shadowed_by_newer_checkout() {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        let paid = subscribe(&store, user_id, 10, 4).await;

        // A later checkout the user never completed.
        let plan = store.get_plan(&paid.plan_id).await.unwrap().unwrap();
        let pending = Subscription::new(user_id, &plan, None, format!("sub_pending_{user_id}"));
        store.insert_subscription(&pending).await.unwrap();

        let meter = meter(store);
        let quota = meter.check_quota(user_id).await.unwrap();
        assert_eq!(quota.status, QuotaStatus::Subscription(SubscriptionStatus::Active));
        assert_eq!(quota.charge_to, Some(paid.id));
        assert_eq!(quota.remaining, 6);

        let summary = meter.usage_summary(user_id).await.unwrap();
        assert_eq!(summary.unit, UsageUnit::Sessions);
        assert_eq!(summary.subscription_status.as_deref(), Some("active"));
    }

    #[tokio::test]
    async fn trial_session_limit_stops_at_remaining_trial() {
        let store = Arc::new(MemoryStore::new());
        let mut user = User::new(UserId::generate());
        user.trial_seconds_used = 599;
        store.insert_user_if_absent(&user).await.unwrap();

        let meter = meter(store);
        let quota = meter.check_quota(user.id).await.unwrap();
        assert_eq!(quota.remaining, 1);
        assert_eq!(meter.session_limit(&quota), chrono::Duration::seconds(1));
    }

    #[test]
    fn charges_follow_the_session_meter() {
        let mut session = Session::open(
            UserId::generate(),
            RoomId::generate(),
            None,
            chrono::Duration::hours(2),
        );
        let end = session.started_at + chrono::Duration::seconds(90);
        assert_eq!(
            UsageMeter::usage_charge(&session, end),
            UsageCharge::TrialSeconds { seconds: 90 }
        );

        let capped = session.started_at + chrono::Duration::hours(5);
        assert_eq!(
            UsageMeter::usage_charge(&session, capped),
            UsageCharge::TrialSeconds { seconds: 7200 }
        );

        let sub_id = vent_core::SubscriptionId::generate();
        session.subscription_id = Some(sub_id);
        assert_eq!(
            UsageMeter::usage_charge(&session, end),
            UsageCharge::Sessions {
                subscription_id: sub_id,
                count: 1
            }
        );
    }
}
