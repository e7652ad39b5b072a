//! In-memory storage implementation.
//!
//! All state sits behind one async mutex, so every trait method is a single
//! critical section. The same uniqueness rules as the PostgreSQL schema are
//! enforced and reported with the same constraint names.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use vent_core::{
    Onboarding, Plan, PlanId, Room, RoomCondition, RoomId, Session, SessionId, Subscription,
    SubscriptionId, SubscriptionStatus, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::schema::constraint;
use crate::{BillingEventRecord, Store, UsageCharge};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    rooms: HashMap<RoomId, Room>,
    sessions: BTreeMap<SessionId, Session>,
    plans: HashMap<PlanId, Plan>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    billing_events: HashMap<String, BillingEventRecord>,
}

impl Inner {
    fn room_of_user(&self, user_id: &UserId) -> Option<&Room> {
        self.rooms.values().find(|r| r.user_id == *user_id)
    }

    fn set_room_condition(&mut self, room_id: &RoomId, condition: RoomCondition) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.condition = condition;
            room.updated_at = Utc::now();
        }
    }
}

/// Memory-backed storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreError::Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn lock(&self) -> Result<tokio::sync::MutexGuard<'_, Inner>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(self.inner.lock().await)
    }
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // User Operations
    // =========================================================================

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.lock().await?.users.get(id).cloned())
    }

    async fn insert_user_if_absent(&self, user: &User) -> Result<User> {
        let mut inner = self.lock().await?;
        Ok(inner
            .users
            .entry(user.id)
            .or_insert_with(|| user.clone())
            .clone())
    }

    async fn update_user_profile(
        &self,
        id: &UserId,
        name: &str,
        age: Option<i32>,
        onboarding: Onboarding,
    ) -> Result<User> {
        let mut inner = self.lock().await?;
        let user = inner.users.get_mut(id).ok_or(StoreError::NotFound)?;
        user.name = name.to_string();
        user.age = age;
        user.onboarding = onboarding;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    // =========================================================================
    // Room Operations
    // =========================================================================

    async fn get_room_by_user(&self, user_id: &UserId) -> Result<Option<Room>> {
        Ok(self.lock().await?.room_of_user(user_id).cloned())
    }

    async fn get_room_by_name(&self, room_name: &str) -> Result<Option<Room>> {
        let inner = self.lock().await?;
        Ok(inner
            .rooms
            .values()
            .find(|r| r.room_name == room_name)
            .cloned())
    }

    async fn insert_room(&self, room: &Room) -> Result<()> {
        let mut inner = self.lock().await?;
        if !inner.users.contains_key(&room.user_id) {
            return Err(StoreError::Database("room owner does not exist".into()));
        }
        if inner.room_of_user(&room.user_id).is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: constraint::ROOM_USER.into(),
            });
        }
        if inner.rooms.values().any(|r| r.room_name == room.room_name) {
            return Err(StoreError::UniqueViolation {
                constraint: constraint::ROOM_NAME.into(),
            });
        }
        inner.rooms.insert(room.id, room.clone());
        Ok(())
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn open_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.lock().await?;
        if !inner.rooms.contains_key(&session.room_id) {
            return Err(StoreError::Database("session room does not exist".into()));
        }
        if inner
            .sessions
            .values()
            .any(|s| s.user_id == session.user_id && s.is_open())
        {
            return Err(StoreError::UniqueViolation {
                constraint: constraint::ONE_OPEN_SESSION.into(),
            });
        }
        inner.sessions.insert(session.id, session.clone());
        inner.set_room_condition(&session.room_id, RoomCondition::On);
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.lock().await?.sessions.get(id).cloned())
    }

    async fn get_open_session(&self, user_id: &UserId) -> Result<Option<Session>> {
        let inner = self.lock().await?;
        Ok(inner
            .sessions
            .values()
            .find(|s| s.user_id == *user_id && s.is_open())
            .cloned())
    }

    async fn close_session(
        &self,
        id: &SessionId,
        finished_at: DateTime<Utc>,
        charge: UsageCharge,
    ) -> Result<Option<Session>> {
        let mut inner = self.lock().await?;
        let Some(session) = inner.sessions.get(id).filter(|s| s.is_open()).cloned() else {
            return Ok(None);
        };

        // Validate the charge target before mutating anything.
        match charge {
            UsageCharge::Sessions {
                subscription_id, ..
            } if !inner.subscriptions.contains_key(&subscription_id) => {
                return Err(StoreError::NotFound);
            }
            UsageCharge::TrialSeconds { .. } if !inner.users.contains_key(&session.user_id) => {
                return Err(StoreError::NotFound);
            }
            _ => {}
        }

        match charge {
            UsageCharge::Sessions {
                subscription_id,
                count,
            } => {
                if let Some(sub) = inner.subscriptions.get_mut(&subscription_id) {
                    sub.session_used += count;
                    sub.version += 1;
                    sub.updated_at = Utc::now();
                }
            }
            UsageCharge::TrialSeconds { seconds } => {
                if let Some(user) = inner.users.get_mut(&session.user_id) {
                    user.trial_seconds_used += seconds;
                    user.updated_at = Utc::now();
                }
            }
        }

        let mut closed = session;
        closed.finished_at = Some(finished_at);
        inner.sessions.insert(closed.id, closed.clone());
        inner.set_room_condition(&closed.room_id, RoomCondition::Off);
        Ok(Some(closed))
    }

    async fn list_overdue_sessions(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Session>> {
        let inner = self.lock().await?;
        let mut overdue: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.is_open() && s.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|s| s.deadline_at);
        overdue.truncate(limit);
        Ok(overdue)
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        let inner = self.lock().await?;
        let mut plans: Vec<Plan> = inner.plans.values().cloned().collect();
        plans.sort_by(|a, b| a.price_cents.cmp(&b.price_cents).then(a.name.cmp(&b.name)));
        Ok(plans)
    }

    async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>> {
        Ok(self.lock().await?.plans.get(id).cloned())
    }

    async fn upsert_plan(&self, plan: &Plan) -> Result<()> {
        let mut inner = self.lock().await?;
        if inner
            .plans
            .values()
            .any(|p| p.id != plan.id && p.gateway_plan_id == plan.gateway_plan_id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: constraint::GATEWAY_PLAN.into(),
            });
        }
        inner.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    async fn get_current_subscription(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        let inner = self.lock().await?;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| s.user_id == *user_id)
            .min_by_key(|s| (s.status.standing(), Reverse(s.created_at)))
            .cloned())
    }

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        Ok(self.lock().await?.subscriptions.get(id).cloned())
    }

    async fn get_subscription_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        let inner = self.lock().await?;
        Ok(inner
            .subscriptions
            .values()
            .find(|s| s.gateway_subscription_id == gateway_subscription_id)
            .cloned())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut inner = self.lock().await?;
        if inner
            .subscriptions
            .values()
            .any(|s| s.gateway_subscription_id == subscription.gateway_subscription_id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: constraint::GATEWAY_SUBSCRIPTION.into(),
            });
        }
        inner
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update_subscription(
        &self,
        subscription: &Subscription,
        event: Option<&BillingEventRecord>,
    ) -> Result<Subscription> {
        let mut inner = self.lock().await?;
        let stored_version = inner
            .subscriptions
            .get(&subscription.id)
            .ok_or(StoreError::NotFound)?
            .version;
        if stored_version != subscription.version {
            return Err(StoreError::VersionConflict);
        }
        if let Some(event) = event {
            if inner.billing_events.contains_key(&event.event_id) {
                return Err(StoreError::DuplicateEvent {
                    event_id: event.event_id.clone(),
                });
            }
            inner
                .billing_events
                .insert(event.event_id.clone(), event.clone());
        }

        let mut updated = subscription.clone();
        updated.version += 1;
        updated.updated_at = Utc::now();
        inner.subscriptions.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn list_due_for_renewal(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>> {
        let inner = self.lock().await?;
        let mut due: Vec<Subscription> = inner
            .subscriptions
            .values()
            .filter(|s| s.next_billing_at.is_some_and(|at| at <= now))
            .filter(|s| {
                s.status == SubscriptionStatus::Active
                    || (s.cancel_at_period_end && !s.status.is_terminal())
            })
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_billing_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn list_grace_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>> {
        let inner = self.lock().await?;
        let mut expired: Vec<Subscription> = inner
            .subscriptions
            .values()
            .filter(|s| s.status == SubscriptionStatus::PastDue)
            .filter(|s| s.grace_period_ends_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        expired.sort_by_key(|s| s.grace_period_ends_at);
        expired.truncate(limit);
        Ok(expired)
    }

    // =========================================================================
    // Billing Event Operations
    // =========================================================================

    async fn has_billing_event(&self, event_id: &str) -> Result<bool> {
        Ok(self.lock().await?.billing_events.contains_key(event_id))
    }

    async fn record_billing_event(&self, event: &BillingEventRecord) -> Result<bool> {
        let mut inner = self.lock().await?;
        if inner.billing_events.contains_key(&event.event_id) {
            return Ok(false);
        }
        inner
            .billing_events
            .insert(event.event_id.clone(), event.clone());
        Ok(true)
    }
}
