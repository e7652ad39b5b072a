//! Storage layer for vent.
//!
//! This crate provides persistence for users, rooms, sessions, plans and
//! subscriptions behind the [`Store`] trait, with two backends:
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`, with embedded migrations
//! - [`MemoryStore`]: in-process, for tests and local development
//!
//! # Concurrency
//!
//! Concurrency control lives in the storage constraints, not in callers:
//!
//! - `room_user_id_key` makes room creation idempotent under races
//! - `sessions_one_open_per_user` (a unique partial index on open sessions) makes
//!   session start exclusive per user
//! - session close is conditional on `finished_at IS NULL`, so exactly one closer
//!   wins and charges usage
//! - usage counters are incremented in place, never read-modify-written
//! - subscriptions carry an optimistic `version`
//!
//! Both backends report violations as [`StoreError::UniqueViolation`] with the
//! constraint names in [`schema::constraint`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vent_core::{
    Onboarding, Plan, PlanId, Room, Session, SessionId, Subscription, SubscriptionId, User,
    UserId,
};

/// Usage charged when a session closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageCharge {
    /// Add sessions to a subscription's `session_used`.
    Sessions {
        /// Subscription to charge.
        subscription_id: SubscriptionId,
        /// Sessions to add.
        count: i64,
    },
    /// Add seconds to the user's `trial_seconds_used`.
    TrialSeconds {
        /// Seconds to add.
        seconds: i64,
    },
}

/// A processed billing event, kept for deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEventRecord {
    /// Gateway event ID.
    pub event_id: String,
    /// Event kind.
    pub event_type: String,
    /// Subscription reference at the gateway.
    pub gateway_subscription_id: String,
    /// When the event was processed.
    pub received_at: DateTime<Utc>,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (PostgreSQL, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // User Operations
    // =========================================================================

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user(&self, id: &UserId) -> Result<Option<User>>;

    /// Insert a user unless one with the same ID exists, returning the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_user_if_absent(&self, user: &User) -> Result<User>;

    /// Update profile fields.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn update_user_profile(
        &self,
        id: &UserId,
        name: &str,
        age: Option<i32>,
        onboarding: Onboarding,
    ) -> Result<User>;

    // =========================================================================
    // Room Operations
    // =========================================================================

    /// Get the room owned by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_room_by_user(&self, user_id: &UserId) -> Result<Option<Room>>;

    /// Get a room by its media-server name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_room_by_name(&self, room_name: &str) -> Result<Option<Room>>;

    /// Insert a room.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` with `room_user_id_key` if the user
    /// already has a room, or `room_room_name_key` if the name is taken.
    async fn insert_room(&self, room: &Room) -> Result<()>;

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Insert an open session and switch its room on, atomically.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` with `sessions_one_open_per_user` if the
    /// user already has an open session.
    async fn open_session(&self, session: &Session) -> Result<()>;

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Get the user's open session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_open_session(&self, user_id: &UserId) -> Result<Option<Session>>;

    /// Close a session if it is still open.
    ///
    /// In one transaction: sets `finished_at`, switches the room off and applies the
    /// usage charge. Returns the closed session to the caller that closed it and
    /// `None` to everyone else, so usage is charged exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn close_session(
        &self,
        id: &SessionId,
        finished_at: DateTime<Utc>,
        charge: UsageCharge,
    ) -> Result<Option<Session>>;

    /// List open sessions whose deadline is at or before `now`, earliest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_overdue_sessions(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Session>>;

    // =========================================================================
    // Plan Operations
    // =========================================================================

    /// List plans ordered by price.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_plans(&self) -> Result<Vec<Plan>>;

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>>;

    /// Insert or replace a plan.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if another plan uses the gateway plan ID.
    async fn upsert_plan(&self, plan: &Plan) -> Result<()>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Get the user's current subscription: the one in the best standing
    /// (`active`, `past_due`, `paused`, `created`, then the rest), newest first
    /// among equals.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_current_subscription(&self, user_id: &UserId) -> Result<Option<Subscription>>;

    /// Get a subscription by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>>;

    /// Get a subscription by its gateway reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_subscription_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>>;

    /// Insert a subscription.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if the gateway reference exists.
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Write a subscription if its `version` still matches the stored one.
    ///
    /// When `event` is given it is recorded in the same transaction. Returns the
    /// stored subscription with its bumped version.
    ///
    /// # Errors
    ///
    /// - `StoreError::VersionConflict` if the subscription changed concurrently.
    /// - `StoreError::DuplicateEvent` if the event was already recorded.
    /// - `StoreError::NotFound` if the subscription doesn't exist.
    async fn update_subscription(
        &self,
        subscription: &Subscription,
        event: Option<&BillingEventRecord>,
    ) -> Result<Subscription>;

    /// List active subscriptions, or ones pending end-of-period cancellation, whose
    /// `next_billing_at` is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_due_for_renewal(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>>;

    /// List past-due subscriptions whose grace deadline is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_grace_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>>;

    // =========================================================================
    // Billing Event Operations (for idempotency)
    // =========================================================================

    /// Check if a billing event has already been processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn has_billing_event(&self, event_id: &str) -> Result<bool>;

    /// Record a billing event. Returns `false` if it was already recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn record_billing_event(&self, event: &BillingEventRecord) -> Result<bool>;
}
