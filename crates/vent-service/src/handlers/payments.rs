//! Payment and usage handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vent_core::PlanId;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::meter::UsageSummary;
use crate::state::AppState;

/// Usage status of the caller.
pub async fn usage(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UsageSummary>, ApiError> {
    Ok(Json(state.meter.usage_summary(auth.user_id).await?))
}

/// Create subscription request.
#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    /// Plan to subscribe to.
    pub plan_id: String,
    /// Customer email for the gateway.
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Customer name for the gateway.
    #[serde(default)]
    pub customer_name: Option<String>,
}

/// Checkout parameters for a new subscription.
#[derive(Debug, Serialize)]
pub struct CreateSubscriptionResponse {
    /// Our subscription ID.
    pub subscription_id: String,
    /// Gateway subscription ID, passed to the checkout widget.
    pub gateway_subscription_id: String,
    /// Gateway public key.
    pub key_id: String,
    /// Hosted checkout link.
    pub short_url: Option<String>,
    /// Subscribed plan.
    pub plan_id: String,
    /// Subscription status (`created`).
    pub status: String,
}

/// Create a subscription and return checkout parameters.
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateSubscriptionRequest>,
) -> Result<Json<CreateSubscriptionResponse>, ApiError> {
    let plan_id: PlanId = body
        .plan_id
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid plan_id".into()))?;

    state.rooms.ensure_user(auth.user_id).await?;

    let email = body.customer_email.as_deref().or(auth.email.as_deref());
    let created = state
        .billing
        .create(auth.user_id, plan_id, email, body.customer_name.as_deref())
        .await?;

    Ok(Json(CreateSubscriptionResponse {
        subscription_id: created.subscription.id.to_string(),
        gateway_subscription_id: created.subscription.gateway_subscription_id,
        key_id: created.key_id,
        short_url: created.short_url,
        plan_id: created.subscription.plan_id.to_string(),
        status: created.subscription.status.to_string(),
    }))
}

/// Cancellation result.
#[derive(Debug, Serialize)]
pub struct CancelSubscriptionResponse {
    /// Subscription ID.
    pub subscription_id: String,
    /// Current status; access continues until the period ends.
    pub status: String,
    /// Always `true`.
    pub cancel_at_period_end: bool,
    /// When access ends.
    pub access_until: Option<DateTime<Utc>>,
}

/// Cancel the caller's subscription at the end of the current period.
pub async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CancelSubscriptionResponse>, ApiError> {
    let subscription = state.billing.cancel(auth.user_id).await?;
    Ok(Json(CancelSubscriptionResponse {
        subscription_id: subscription.id.to_string(),
        status: subscription.status.to_string(),
        cancel_at_period_end: subscription.cancel_at_period_end,
        access_until: subscription.next_billing_at,
    }))
}
