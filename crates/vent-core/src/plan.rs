//! Billing plans.

use serde::{Deserialize, Serialize};

use crate::PlanId;

/// A billing plan. Static reference data shared by all users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan ID.
    pub id: PlanId,

    /// Display name.
    pub name: String,

    /// Monthly price in the smallest currency unit.
    pub price_cents: i64,

    /// Sessions allowed per billing cycle.
    pub session_limit: i64,

    /// Plan reference at the payment gateway.
    pub gateway_plan_id: String,
}
