//! Subscription service.
//!
//! Drives the subscription state machine from validated gateway events and from
//! scheduled sweeps, and talks to the gateway for checkout and cancellation.
//! Writes are optimistic: a version conflict re-reads the subscription and
//! re-applies the change.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use vent_core::{
    BillingEvent, PlanId, Renewal, Subscription, SubscriptionId, SubscriptionStatus, Transition,
    UserId, VentError,
};
use vent_store::{BillingEventRecord, Store, StoreError};

use crate::deadline::{bounded, within};
use crate::gateway::client::is_not_found;
use crate::gateway::RazorpayClient;

/// Attempts at an optimistic subscription write before giving up.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Subscriptions handled per sweep pass.
const SWEEP_BATCH_SIZE: usize = 200;

/// Outcome of applying a billing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The subscription changed.
    Applied {
        /// Status before.
        from: SubscriptionStatus,
        /// Status after.
        to: SubscriptionStatus,
    },
    /// The event ID was processed before.
    Duplicate,
    /// The event is older than the last applied one.
    Stale,
    /// The event has no effect in the current status.
    Ignored,
    /// No subscription carries the gateway reference.
    UnknownSubscription,
}

/// A subscription created at the gateway, with what checkout needs.
#[derive(Debug, Clone)]
pub struct CreatedSubscription {
    /// The stored subscription.
    pub subscription: Subscription,
    /// Gateway public key for the checkout widget.
    pub key_id: String,
    /// Hosted checkout link.
    pub short_url: Option<String>,
}

/// Subscription lifecycle operations.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn Store>,
    timeout: Duration,
    gateway: Option<Arc<RazorpayClient>>,
    grace: chrono::Duration,
}

impl SubscriptionService {
    /// Create the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        timeout: Duration,
        gateway: Option<Arc<RazorpayClient>>,
        grace: chrono::Duration,
    ) -> Self {
        Self {
            store,
            timeout,
            gateway,
            grace,
        }
    }

    fn gateway(&self) -> Result<&RazorpayClient, VentError> {
        self.gateway
            .as_deref()
            .ok_or_else(|| VentError::ExternalService {
                service: "razorpay".into(),
                message: "payment gateway not configured".into(),
            })
    }

    /// Create a gateway subscription for `plan_id` and store it as `created`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the plan does not exist.
    /// - `Conflict` if the user already has a live subscription.
    ///
    /// A pending `created` subscription from an abandoned checkout is cancelled
    /// first, so the user never holds two.
    pub async fn create(
        &self,
        user_id: UserId,
        plan_id: PlanId,
        customer_email: Option<&str>,
        customer_name: Option<&str>,
    ) -> Result<CreatedSubscription, VentError> {
        let gateway = self.gateway()?;

        let plan = bounded(self.timeout, self.store.get_plan(&plan_id))
            .await?
            .ok_or_else(|| VentError::NotFound {
                entity: "plan",
                id: plan_id.to_string(),
            })?;

        let current = bounded(self.timeout, self.store.get_current_subscription(&user_id)).await?;
        if let Some(live) = current.as_ref().filter(|s| s.status.is_live()) {
            return Err(VentError::Conflict(format!(
                "subscription {} is {}",
                live.id, live.status
            )));
        }

        // An abandoned checkout is replaced, never left beside the new one.
        if let Some(pending) = current.as_ref().filter(|s| s.status == SubscriptionStatus::Created) {
            self.cancel_immediately(pending).await?;
            tracing::info!(
                user_id = %user_id,
                subscription_id = %pending.id,
                "Pending subscription replaced by new checkout"
            );
        }

        let user_ref = user_id.to_string();
        let customer_id = match current.and_then(|s| s.gateway_customer_id) {
            Some(existing) => existing,
            None => {
                let customer = gateway
                    .create_customer(&user_ref, customer_email, customer_name)
                    .await?;
                tracing::info!(user_id = %user_id, customer_id = %customer.id, "Gateway customer created");
                customer.id
            }
        };

        let remote = gateway
            .create_subscription(&user_ref, &plan.gateway_plan_id, Some(&customer_id))
            .await?;

        let subscription = Subscription::new(user_id, &plan, Some(customer_id), remote.id);
        bounded(self.timeout, self.store.insert_subscription(&subscription)).await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            gateway_subscription_id = %subscription.gateway_subscription_id,
            plan = %plan.name,
            "Subscription created"
        );

        Ok(CreatedSubscription {
            subscription,
            key_id: gateway.key_id().to_string(),
            short_url: remote.short_url,
        })
    }

    /// Cancel the user's subscription at the end of the current period.
    ///
    /// Access continues until `next_billing_at`, when the renewal sweep makes the
    /// cancellation effective. Repeated calls are no-ops. A subscription that was
    /// never paid for has no period to run out and is cancelled at once.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user has no cancellable subscription.
    pub async fn cancel(&self, user_id: UserId) -> Result<Subscription, VentError> {
        let subscription = bounded(self.timeout, self.store.get_current_subscription(&user_id))
            .await?
            .filter(|s| !s.status.is_terminal())
            .ok_or_else(|| VentError::NotFound {
                entity: "subscription",
                id: user_id.to_string(),
            })?;

        if subscription.status.is_unpaid() {
            let cancelled = self.cancel_immediately(&subscription).await?;
            tracing::info!(
                user_id = %user_id,
                subscription_id = %cancelled.id,
                "Unpaid subscription cancelled"
            );
            return Ok(cancelled);
        }

        if subscription.cancel_at_period_end {
            return Ok(subscription);
        }

        self.cancel_at_gateway(&subscription, true).await?;

        let updated = self
            .update_with_retry(subscription.id, |s| {
                (!s.status.is_terminal() && !s.cancel_at_period_end).then(|| {
                    s.cancel_at_period_end = true;
                    s.updated_at = Utc::now();
                })
            })
            .await?;

        let subscription = match updated {
            Some((stored, ())) => stored,
            None => bounded(self.timeout, self.store.get_subscription(&subscription.id))
                .await?
                .unwrap_or(subscription),
        };

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            effective_at = ?subscription.next_billing_at,
            "Subscription cancellation scheduled"
        );
        Ok(subscription)
    }

    /// Apply a validated billing event exactly once.
    pub async fn apply_event(&self, event: &BillingEvent) -> Result<ApplyOutcome, VentError> {
        if bounded(self.timeout, self.store.has_billing_event(&event.event_id)).await? {
            tracing::info!(event_id = %event.event_id, "Duplicate billing event ignored");
            return Ok(ApplyOutcome::Duplicate);
        }

        let record = BillingEventRecord {
            event_id: event.event_id.clone(),
            event_type: event.kind.as_str().to_string(),
            gateway_subscription_id: event.gateway_subscription_id.clone(),
            received_at: Utc::now(),
        };

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(mut subscription) = bounded(
                self.timeout,
                self.store
                    .get_subscription_by_gateway_id(&event.gateway_subscription_id),
            )
            .await?
            else {
                tracing::warn!(
                    event_id = %event.event_id,
                    gateway_subscription_id = %event.gateway_subscription_id,
                    "Billing event for unknown subscription"
                );
                return Ok(ApplyOutcome::UnknownSubscription);
            };

            match subscription.apply(event, self.grace) {
                Transition::Applied { from, to } => {
                    match within(
                        self.timeout,
                        self.store.update_subscription(&subscription, Some(&record)),
                    )
                    .await?
                    {
                        Ok(_) => {
                            tracing::info!(
                                event_id = %event.event_id,
                                subscription_id = %subscription.id,
                                from = %from,
                                to = %to,
                                "Subscription transitioned"
                            );
                            return Ok(ApplyOutcome::Applied { from, to });
                        }
                        Err(StoreError::DuplicateEvent { .. }) => {
                            return Ok(ApplyOutcome::Duplicate);
                        }
                        Err(StoreError::VersionConflict) => {
                            tracing::debug!(subscription_id = %subscription.id, "Version conflict, retrying event");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Transition::Stale { last_event_at } => {
                    tracing::info!(
                        event_id = %event.event_id,
                        occurred_at = %event.occurred_at,
                        last_event_at = %last_event_at,
                        "Stale billing event ignored"
                    );
                    return self.record_only(&record, ApplyOutcome::Stale).await;
                }
                Transition::Ignored { status } => {
                    tracing::info!(
                        event_id = %event.event_id,
                        kind = %event.kind,
                        status = %status,
                        "Billing event has no effect in current status"
                    );
                    return self.record_only(&record, ApplyOutcome::Ignored).await;
                }
            }
        }

        Err(VentError::Unavailable(
            "subscription kept changing while applying event".into(),
        ))
    }

    /// Run scheduled renewals due at `now`. Returns how many subscriptions changed.
    pub async fn run_renewals(&self, now: DateTime<Utc>) -> Result<usize, VentError> {
        let due = bounded(
            self.timeout,
            self.store.list_due_for_renewal(now, SWEEP_BATCH_SIZE),
        )
        .await?;

        let mut changed = 0;
        for subscription in due {
            let result = self
                .update_with_retry(subscription.id, |s| match s.renew(now) {
                    Renewal::NotDue => None,
                    outcome => Some(outcome),
                })
                .await;
            match result {
                Ok(Some((stored, Renewal::Renewed))) => {
                    changed += 1;
                    tracing::info!(subscription_id = %stored.id, next_billing_at = ?stored.next_billing_at, "Subscription renewed");
                }
                Ok(Some((stored, _))) => {
                    changed += 1;
                    tracing::info!(subscription_id = %stored.id, "Subscription cancelled at period end");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(subscription_id = %subscription.id, error = %e, "Renewal failed");
                }
            }
        }
        Ok(changed)
    }

    /// Cancel past-due subscriptions whose grace period elapsed.
    pub async fn expire_grace(&self, now: DateTime<Utc>) -> Result<usize, VentError> {
        let expired = bounded(
            self.timeout,
            self.store.list_grace_expired(now, SWEEP_BATCH_SIZE),
        )
        .await?;

        let mut changed = 0;
        for subscription in expired {
            match self
                .update_with_retry(subscription.id, |s| s.expire_grace(now).then_some(()))
                .await
            {
                Ok(Some((stored, ()))) => {
                    changed += 1;
                    tracing::info!(subscription_id = %stored.id, "Grace period expired, subscription cancelled");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(subscription_id = %subscription.id, error = %e, "Grace expiry failed");
                }
            }
        }
        Ok(changed)
    }

    /// Cancel a subscription at the gateway. A subscription the gateway does not
    /// know is cancelled locally only.
    async fn cancel_at_gateway(
        &self,
        subscription: &Subscription,
        at_cycle_end: bool,
    ) -> Result<(), VentError> {
        let Some(gateway) = &self.gateway else {
            tracing::warn!("Payment gateway not configured - cancelling locally only");
            return Ok(());
        };
        match gateway
            .cancel_subscription(&subscription.gateway_subscription_id, at_cycle_end)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    "Subscription unknown to gateway, cancelling locally"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel a subscription now, at the gateway and locally.
    async fn cancel_immediately(&self, subscription: &Subscription) -> Result<Subscription, VentError> {
        self.cancel_at_gateway(subscription, false).await?;
        let updated = self
            .update_with_retry(subscription.id, |s| s.cancel_now(Utc::now()).then_some(()))
            .await?;
        Ok(match updated {
            Some((stored, ())) => stored,
            None => bounded(self.timeout, self.store.get_subscription(&subscription.id))
                .await?
                .unwrap_or_else(|| subscription.clone()),
        })
    }

    async fn record_only(
        &self,
        record: &BillingEventRecord,
        outcome: ApplyOutcome,
    ) -> Result<ApplyOutcome, VentError> {
        let fresh = bounded(self.timeout, self.store.record_billing_event(record)).await?;
        Ok(if fresh { outcome } else { ApplyOutcome::Duplicate })
    }

    /// Re-read, mutate and write a subscription until the write lands.
    ///
    /// `change` returns `None` to leave the subscription untouched.
    async fn update_with_retry<R, F>(
        &self,
        id: SubscriptionId,
        change: F,
    ) -> Result<Option<(Subscription, R)>, VentError>
    where
        F: Fn(&mut Subscription) -> Option<R>,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut subscription = bounded(self.timeout, self.store.get_subscription(&id))
                .await?
                .ok_or_else(|| VentError::NotFound {
                    entity: "subscription",
                    id: id.to_string(),
                })?;

            let Some(result) = change(&mut subscription) else {
                return Ok(None);
            };

            match within(self.timeout, self.store.update_subscription(&subscription, None)).await? {
                Ok(stored) => return Ok(Some((stored, result))),
                Err(StoreError::VersionConflict) => {
                    tracing::debug!(subscription_id = %id, "Version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(VentError::Unavailable(
            "subscription kept changing, retry".into(),
        ))
    }
}
