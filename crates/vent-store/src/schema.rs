//! Schema names shared by every backend.
//!
//! Constraint names are part of the store contract: callers match on them to tell
//! an expected race from a bug.

/// Constraint names reported in [`StoreError::UniqueViolation`](crate::StoreError).
pub mod constraint {
    /// One room per user.
    pub const ROOM_USER: &str = "room_user_id_key";

    /// Room names are unique.
    pub const ROOM_NAME: &str = "room_room_name_key";

    /// At most one session with a null `finished_at` per user.
    pub const ONE_OPEN_SESSION: &str = "sessions_one_open_per_user";

    /// Gateway subscription references are unique.
    pub const GATEWAY_SUBSCRIPTION: &str = "payments_gateway_subscription_id_key";

    /// Gateway plan references are unique.
    pub const GATEWAY_PLAN: &str = "plans_gateway_plan_id_key";
}

/// Name of the `payment_status` enum type.
pub const PAYMENT_STATUS_TYPE: &str = "payment_status";
