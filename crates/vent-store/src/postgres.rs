//! PostgreSQL storage implementation.
//!
//! Enum columns are read as text (`status::text`) and written with an explicit
//! cast, so the Rust vocabulary stays the single place that knows the labels.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use vent_core::{
    Onboarding, Plan, PlanId, Room, RoomCondition, RoomId, Session, SessionId, Subscription,
    SubscriptionId, SubscriptionStatus, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::schema::PAYMENT_STATUS_TYPE;
use crate::{BillingEventRecord, Store, UsageCharge};

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    age: Option<i32>,
    onboarding: String,
    trial_seconds_used: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            name: row.name,
            age: row.age,
            onboarding: Onboarding::parse(&row.onboarding),
            trial_seconds_used: row.trial_seconds_used,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const USER_COLUMNS: &str = "id, name, age, onboarding, trial_seconds_used, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    user_id: Uuid,
    room_name: String,
    condition: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RoomRow> for Room {
    type Error = StoreError;

    fn try_from(row: RoomRow) -> Result<Self> {
        let condition = row
            .condition
            .parse::<RoomCondition>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self {
            id: RoomId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            room_name: row.room_name,
            condition,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ROOM_COLUMNS: &str =
    "id, user_id, room_name, condition::text AS condition, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    room_id: Uuid,
    subscription_id: Option<Uuid>,
    started_at: DateTime<Utc>,
    deadline_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: SessionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            room_id: RoomId::from_uuid(row.room_id),
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            started_at: row.started_at,
            deadline_at: row.deadline_at,
            finished_at: row.finished_at,
        }
    }
}

const SESSION_COLUMNS: &str =
    "id, user_id, room_id, subscription_id, started_at, deadline_at, finished_at";

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    name: String,
    price_cents: i64,
    session_limit: i64,
    gateway_plan_id: String,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Self {
            id: PlanId::from_uuid(row.id),
            name: row.name,
            price_cents: row.price_cents,
            session_limit: row.session_limit,
            gateway_plan_id: row.gateway_plan_id,
        }
    }
}

const PLAN_COLUMNS: &str = "id, name, price_cents, session_limit, gateway_plan_id";

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    plan_id: Uuid,
    gateway_customer_id: Option<String>,
    gateway_subscription_id: String,
    status: String,
    session_limit: i64,
    session_used: i64,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    next_billing_at: Option<DateTime<Utc>>,
    grace_period_ends_at: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    last_payment_id: Option<String>,
    last_payment_at: Option<DateTime<Utc>>,
    last_payment_amount_cents: Option<i64>,
    last_event_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            plan_id: PlanId::from_uuid(row.plan_id),
            gateway_customer_id: row.gateway_customer_id,
            gateway_subscription_id: row.gateway_subscription_id,
            status: SubscriptionStatus::parse_lenient(&row.status),
            session_limit: row.session_limit,
            session_used: row.session_used,
            period_start: row.period_start,
            period_end: row.period_end,
            next_billing_at: row.next_billing_at,
            grace_period_ends_at: row.grace_period_ends_at,
            cancel_at_period_end: row.cancel_at_period_end,
            last_payment_id: row.last_payment_id,
            last_payment_at: row.last_payment_at,
            last_payment_amount_cents: row.last_payment_amount_cents,
            last_event_at: row.last_event_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, gateway_customer_id, \
     gateway_subscription_id, status::text AS status, session_limit, session_used, \
     period_start, period_end, next_billing_at, grace_period_ends_at, cancel_at_period_end, \
     last_payment_id, last_payment_at, last_payment_amount_cents, last_event_at, version, \
     created_at, updated_at";

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// Store
// ============================================================================

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool without running migrations.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Compare the database's `payment_status` labels with the known vocabulary.
    ///
    /// Returns labels the database has that this build does not know. Rows with
    /// those labels read as `Unknown` and never transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails.
    pub async fn verify_status_vocabulary(&self) -> Result<Vec<String>> {
        let labels: Vec<String> = sqlx::query_scalar(
            "SELECT e.enumlabel::text FROM pg_enum e
             JOIN pg_type t ON t.oid = e.enumtypid
             WHERE t.typname = $1
             ORDER BY e.enumsortorder",
        )
        .bind(PAYMENT_STATUS_TYPE)
        .fetch_all(&self.pool)
        .await?;

        let unknown: Vec<String> = labels
            .into_iter()
            .filter(|label| label.parse::<SubscriptionStatus>().is_err())
            .collect();

        if unknown.is_empty() {
            tracing::debug!(
                version = vent_core::STATUS_VOCABULARY_VERSION,
                "Payment status vocabulary matches"
            );
        } else {
            tracing::warn!(
                version = vent_core::STATUS_VOCABULARY_VERSION,
                unknown = ?unknown,
                "Database has payment statuses this build does not know"
            );
        }
        Ok(unknown)
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // User Operations
    // =========================================================================

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn insert_user_if_absent(&self, user: &User) -> Result<User> {
        sqlx::query(
            "INSERT INTO users (id, name, age, onboarding, trial_seconds_used, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(user.age)
        .bind(user.onboarding.as_str())
        .bind(user.trial_seconds_used)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        self.get_user(&user.id).await?.ok_or(StoreError::NotFound)
    }

    async fn update_user_profile(
        &self,
        id: &UserId,
        name: &str,
        age: Option<i32>,
        onboarding: Onboarding,
    ) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET name = $2, age = $3, onboarding = $4, updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(name)
        .bind(age)
        .bind(onboarding.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::from).ok_or(StoreError::NotFound)
    }

    // =========================================================================
    // Room Operations
    // =========================================================================

    async fn get_room_by_user(&self, user_id: &UserId) -> Result<Option<Room>> {
        sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM room WHERE user_id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Room::try_from)
        .transpose()
    }

    async fn get_room_by_name(&self, room_name: &str) -> Result<Option<Room>> {
        sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM room WHERE room_name = $1"
        ))
        .bind(room_name)
        .fetch_optional(&self.pool)
        .await?
        .map(Room::try_from)
        .transpose()
    }

    async fn insert_room(&self, room: &Room) -> Result<()> {
        sqlx::query(
            "INSERT INTO room (id, user_id, room_name, condition, created_at, updated_at)
             VALUES ($1, $2, $3, $4::room_condition, $5, $6)",
        )
        .bind(room.id.as_uuid())
        .bind(room.user_id.as_uuid())
        .bind(&room.room_name)
        .bind(room.condition.as_str())
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn open_session(&self, session: &Session) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO sessions
                (id, user_id, room_id, subscription_id, started_at, deadline_at, finished_at)
             VALUES ($1, $2, $3, $4, $5, $6, NULL)",
        )
        .bind(session.id.to_uuid())
        .bind(session.user_id.as_uuid())
        .bind(session.room_id.as_uuid())
        .bind(session.subscription_id.map(|id| *id.as_uuid()))
        .bind(session.started_at)
        .bind(session.deadline_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE room SET condition = 'on', updated_at = now() WHERE id = $1")
            .bind(session.room_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id.to_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn get_open_session(&self, user_id: &UserId) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 AND finished_at IS NULL"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn close_session(
        &self,
        id: &SessionId,
        finished_at: DateTime<Utc>,
        charge: UsageCharge,
    ) -> Result<Option<Session>> {
        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query_as::<_, SessionRow>(&format!(
            "UPDATE sessions SET finished_at = $2
             WHERE id = $1 AND finished_at IS NULL
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id.to_uuid())
        .bind(finished_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(closed) = closed.map(Session::from) else {
            return Ok(None);
        };

        let charged = match charge {
            UsageCharge::Sessions {
                subscription_id,
                count,
            } => sqlx::query(
                "UPDATE payments
                 SET session_used = session_used + $2, version = version + 1, updated_at = now()
                 WHERE id = $1",
            )
            .bind(subscription_id.as_uuid())
            .bind(count)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            UsageCharge::TrialSeconds { seconds } => sqlx::query(
                "UPDATE users
                 SET trial_seconds_used = trial_seconds_used + $2, updated_at = now()
                 WHERE id = $1",
            )
            .bind(closed.user_id.as_uuid())
            .bind(seconds)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
        };
        if charged == 0 {
            return Err(StoreError::NotFound);
        }

        sqlx::query("UPDATE room SET condition = 'off', updated_at = now() WHERE id = $1")
            .bind(closed.room_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(closed))
    }

    async fn list_overdue_sessions(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE finished_at IS NULL AND deadline_at <= $1
             ORDER BY deadline_at
             LIMIT $2"
        ))
        .bind(now)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        let rows = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans ORDER BY price_cents, name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Plan::from).collect())
    }

    async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Plan::from))
    }

    async fn upsert_plan(&self, plan: &Plan) -> Result<()> {
        sqlx::query(
            "INSERT INTO plans (id, name, price_cents, session_limit, gateway_plan_id)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                session_limit = EXCLUDED.session_limit,
                gateway_plan_id = EXCLUDED.gateway_plan_id,
                updated_at = now()",
        )
        .bind(plan.id.as_uuid())
        .bind(&plan.name)
        .bind(plan.price_cents)
        .bind(plan.session_limit)
        .bind(&plan.gateway_plan_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    async fn get_current_subscription(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM payments
             WHERE user_id = $1
             ORDER BY CASE status
                        WHEN 'active' THEN 0
                        WHEN 'past_due' THEN 1
                        WHEN 'paused' THEN 2
                        WHEN 'created' THEN 3
                        ELSE 4
                      END,
                      created_at DESC
             LIMIT 1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Subscription::from))
    }

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Subscription::from))
    }

    async fn get_subscription_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM payments WHERE gateway_subscription_id = $1"
        ))
        .bind(gateway_subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Subscription::from))
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            "INSERT INTO payments (
                id, user_id, plan_id, gateway_customer_id, gateway_subscription_id, status,
                session_limit, session_used, period_start, period_end, next_billing_at,
                grace_period_ends_at, cancel_at_period_end, version, created_at, updated_at
             ) VALUES ($1, $2, $3, $4, $5, $6::payment_status, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_uuid())
        .bind(subscription.plan_id.as_uuid())
        .bind(&subscription.gateway_customer_id)
        .bind(&subscription.gateway_subscription_id)
        .bind(subscription.status.as_str())
        .bind(subscription.session_limit)
        .bind(subscription.session_used)
        .bind(subscription.period_start)
        .bind(subscription.period_end)
        .bind(subscription.next_billing_at)
        .bind(subscription.grace_period_ends_at)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.version)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_subscription(
        &self,
        subscription: &Subscription,
        event: Option<&BillingEventRecord>,
    ) -> Result<Subscription> {
        let mut tx = self.pool.begin().await?;

        if let Some(event) = event {
            let inserted = sqlx::query(
                "INSERT INTO billing_events (event_id, event_type, gateway_subscription_id, received_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (event_id) DO NOTHING",
            )
            .bind(&event.event_id)
            .bind(&event.event_type)
            .bind(&event.gateway_subscription_id)
            .bind(event.received_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if inserted == 0 {
                return Err(StoreError::DuplicateEvent {
                    event_id: event.event_id.clone(),
                });
            }
        }

        // Session closes bump `version`, so a stale `session_used` cannot be written back.
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "UPDATE payments SET
                status = $3::payment_status,
                period_start = $4,
                period_end = $5,
                next_billing_at = $6,
                grace_period_ends_at = $7,
                cancel_at_period_end = $8,
                last_payment_id = $9,
                last_payment_at = $10,
                last_payment_amount_cents = $11,
                last_event_at = $12,
                session_used = $13,
                gateway_customer_id = $14,
                version = version + 1,
                updated_at = now()
             WHERE id = $1 AND version = $2
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(subscription.id.as_uuid())
        .bind(subscription.version)
        .bind(subscription.status.as_str())
        .bind(subscription.period_start)
        .bind(subscription.period_end)
        .bind(subscription.next_billing_at)
        .bind(subscription.grace_period_ends_at)
        .bind(subscription.cancel_at_period_end)
        .bind(&subscription.last_payment_id)
        .bind(subscription.last_payment_at)
        .bind(subscription.last_payment_amount_cents)
        .bind(subscription.last_event_at)
        .bind(subscription.session_used)
        .bind(&subscription.gateway_customer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT version FROM payments WHERE id = $1")
                    .bind(subscription.id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(if exists.is_some() {
                StoreError::VersionConflict
            } else {
                StoreError::NotFound
            });
        };

        tx.commit().await?;
        Ok(Subscription::from(row))
    }

    async fn list_due_for_renewal(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM payments
             WHERE next_billing_at <= $1
               AND (status = 'active' OR (cancel_at_period_end AND status <> 'cancelled'))
             ORDER BY next_billing_at
             LIMIT $2"
        ))
        .bind(now)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn list_grace_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM payments
             WHERE status = 'past_due' AND grace_period_ends_at <= $1
             ORDER BY grace_period_ends_at
             LIMIT $2"
        ))
        .bind(now)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    // =========================================================================
    // Billing Event Operations
    // =========================================================================

    async fn has_billing_event(&self, event_id: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM billing_events WHERE event_id = $1)")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn record_billing_event(&self, event: &BillingEventRecord) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO billing_events (event_id, event_type, gateway_subscription_id, received_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.gateway_subscription_id)
        .bind(event.received_at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted == 1)
    }
}
