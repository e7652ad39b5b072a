//! Request and response types for the vent client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use vent_core::{Plan, RoomCondition};

/// The caller's room.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomInfo {
    /// Room ID.
    pub room_id: String,
    /// Media-server room name.
    pub room_name: String,
    /// Whether a session is running in the room.
    pub room_condition: RoomCondition,
}

/// Result of an explicit room create.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRoom {
    /// Room ID.
    pub room_id: String,
    /// Media-server room name.
    pub room_name: String,
}

/// Onboarding request.
#[derive(Debug, Clone, Serialize)]
pub struct SetupRequest {
    /// Display name.
    pub name: String,
    /// Age, if given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
}

/// Onboarding result.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupResponse {
    /// User ID.
    pub user_id: String,
    /// Room ID.
    pub room_id: String,
    /// Media-server room name.
    pub room_name: String,
    /// `setup_complete`.
    pub status: String,
}

/// A started (or resumed) session with its media grant.
#[derive(Debug, Clone, Deserialize)]
pub struct StartedSession {
    /// Session ID.
    pub session_id: String,
    /// Media-server room name.
    pub room_name: String,
    /// Media access token.
    pub token: String,
    /// Media server URL.
    pub livekit_url: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// Whether an already open session was returned.
    #[serde(default)]
    pub resumed: bool,
}

/// An open session.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveSession {
    /// Session ID.
    pub session_id: String,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// Media-server room name.
    pub room_name: String,
    /// Room condition.
    pub room_condition: RoomCondition,
}

/// Usage status.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageStatus {
    /// Allowance of the active meter.
    pub session_limit: i64,
    /// Consumption against the allowance.
    pub session_used: i64,
    /// What is left.
    pub remaining: i64,
    /// `trial` or the subscription status.
    pub status: String,
    /// `sessions` or `seconds`.
    pub unit: String,
    /// Start of the next billing cycle.
    #[serde(default)]
    pub next_billing_at: Option<DateTime<Utc>>,
    /// Deadline for a successful charge while past due.
    #[serde(default)]
    pub grace_period_ends_at: Option<DateTime<Utc>>,
    /// Whether the subscription ends with the current cycle.
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// Status of the latest subscription.
    #[serde(default)]
    pub subscription_status: Option<String>,
}

impl UsageStatus {
    /// Whether the trial meter is in effect.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.status == "trial"
    }
}

/// Create subscription request.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSubscriptionRequest {
    /// Plan to subscribe to.
    pub plan_id: String,
    /// Customer email for the gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    /// Customer name for the gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
}

/// Checkout parameters for the payment widget.
#[derive(Debug, Clone, Deserialize)]
pub struct Checkout {
    /// Subscription ID.
    pub subscription_id: String,
    /// Gateway subscription ID.
    pub gateway_subscription_id: String,
    /// Gateway public key.
    pub key_id: String,
    /// Hosted checkout link.
    #[serde(default)]
    pub short_url: Option<String>,
    /// Subscribed plan.
    pub plan_id: String,
    /// Subscription status.
    pub status: String,
}

/// Cancellation result.
#[derive(Debug, Clone, Deserialize)]
pub struct Cancellation {
    /// Subscription ID.
    pub subscription_id: String,
    /// Current status.
    pub status: String,
    /// Whether the subscription ends with the current cycle.
    pub cancel_at_period_end: bool,
    /// When access ends.
    #[serde(default)]
    pub access_until: Option<DateTime<Utc>>,
}

/// Public client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Media server URL.
    pub livekit_url: String,
    /// `running`.
    pub server_status: String,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
