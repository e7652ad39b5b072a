//! Razorpay API types.

use serde::{Deserialize, Serialize};

/// Razorpay customer object.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    /// Customer ID (`cust_...`).
    pub id: String,
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Customer name.
    #[serde(default)]
    pub name: Option<String>,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created_at: i64,
}

/// Razorpay subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySubscription {
    /// Subscription ID (`sub_...`).
    pub id: String,
    /// Gateway plan ID.
    #[serde(default)]
    pub plan_id: Option<String>,
    /// Customer ID.
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Gateway-side status.
    #[serde(default)]
    pub status: Option<String>,
    /// Hosted checkout link.
    #[serde(default)]
    pub short_url: Option<String>,
    /// Current cycle start (Unix).
    #[serde(default)]
    pub current_start: Option<i64>,
    /// Current cycle end (Unix).
    #[serde(default)]
    pub current_end: Option<i64>,
    /// Whether the subscription ends at cycle end.
    #[serde(default)]
    pub ended_at: Option<i64>,
}

/// Body of `POST /customers`.
#[derive(Debug, Serialize)]
pub struct CreateCustomer<'a> {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
    /// `"0"` returns the existing customer instead of failing on duplicates.
    pub fail_existing: &'static str,
    /// Free-form notes.
    pub notes: Notes<'a>,
}

/// Body of `POST /subscriptions`.
#[derive(Debug, Serialize)]
pub struct CreateSubscription<'a> {
    /// Gateway plan ID.
    pub plan_id: &'a str,
    /// Number of billing cycles.
    pub total_count: u32,
    /// Customer to bill.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<&'a str>,
    /// Whether Razorpay emails the customer (1) or we do (0).
    pub customer_notify: u8,
    /// Free-form notes.
    pub notes: Notes<'a>,
}

/// Body of `POST /subscriptions/{id}/cancel`.
#[derive(Debug, Serialize)]
pub struct CancelSubscription {
    /// 1 cancels at cycle end, 0 immediately.
    pub cancel_at_cycle_end: u8,
}

/// Notes attached to gateway objects.
#[derive(Debug, Serialize)]
pub struct Notes<'a> {
    /// Our user ID.
    pub user_id: &'a str,
}

/// Razorpay error envelope.
#[derive(Debug, Deserialize)]
pub struct RazorpayErrorResponse {
    /// Error details.
    pub error: RazorpayErrorBody,
}

/// Razorpay error details.
#[derive(Debug, Deserialize)]
pub struct RazorpayErrorBody {
    /// Error code (`BAD_REQUEST_ERROR`, ...).
    pub code: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

// ============================================================================
// Webhook payloads
// ============================================================================

/// Webhook envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    /// Event name (`subscription.charged`, ...).
    pub event: String,
    /// Entities included in the payload.
    #[serde(default)]
    pub payload: WebhookPayload,
    /// Event time (Unix).
    pub created_at: i64,
}

/// Entities carried by a webhook.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    /// Subscription entity.
    #[serde(default)]
    pub subscription: Option<EntityWrapper<GatewaySubscription>>,
    /// Payment entity.
    #[serde(default)]
    pub payment: Option<EntityWrapper<PaymentEntity>>,
}

/// `{"entity": ...}` wrapper used by webhook payloads.
#[derive(Debug, Deserialize)]
pub struct EntityWrapper<T> {
    /// The wrapped entity.
    pub entity: T,
}

/// Payment entity in webhooks.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    /// Payment ID (`pay_...`).
    pub id: String,
    /// Amount in the smallest currency unit.
    #[serde(default)]
    pub amount: Option<i64>,
    /// Payment status.
    #[serde(default)]
    pub status: Option<String>,
    /// Subscription the payment belongs to, when present.
    #[serde(default)]
    pub subscription_id: Option<String>,
}
