//! Webhook handlers for Razorpay and LiveKit.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::billing::ApplyOutcome;
use crate::error::ApiError;
use crate::gateway::webhook::{parse_event, verify_signature, EVENT_ID_HEADER, SIGNATURE_HEADER};
use crate::media::parse_webhook_event;
use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
    /// What processing did with it.
    pub outcome: &'static str,
}

impl WebhookResponse {
    const fn received(outcome: &'static str) -> Self {
        Self {
            received: true,
            outcome,
        }
    }
}

/// Handle Razorpay webhooks.
///
/// Duplicate, stale and irrelevant events are acknowledged with 200 so the gateway
/// does not disable the endpoint.
pub async fn razorpay_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.razorpay_webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing Razorpay signature".into()))?;

        verify_signature(secret, &body, signature).map_err(|e| {
            tracing::warn!(error = %e, "Invalid Razorpay webhook signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;
    } else {
        tracing::warn!("Razorpay webhook_secret not configured - skipping signature verification");
    }

    let event_id = headers.get(EVENT_ID_HEADER).and_then(|v| v.to_str().ok());
    let Some(event) = parse_event(&body, event_id).map_err(|e| ApiError::BadRequest(e.to_string()))?
    else {
        tracing::debug!("Unhandled Razorpay event");
        return Ok(Json(WebhookResponse::received("unhandled")));
    };

    tracing::info!(
        event_id = %event.event_id,
        kind = %event.kind,
        gateway_subscription_id = %event.gateway_subscription_id,
        "Received Razorpay webhook"
    );

    let outcome = match state.billing.apply_event(&event).await? {
        ApplyOutcome::Applied { .. } => "applied",
        ApplyOutcome::Duplicate => "duplicate",
        ApplyOutcome::Stale => "stale",
        ApplyOutcome::Ignored => "ignored",
        ApplyOutcome::UnknownSubscription => "unknown_subscription",
    };
    Ok(Json(WebhookResponse::received(outcome)))
}

/// LiveKit webhook response.
#[derive(Debug, Serialize)]
pub struct LiveKitWebhookResponse {
    /// Always `received`.
    pub status: &'static str,
}

/// Handle LiveKit webhooks.
///
/// `room_finished` closes the room's open session through the ledger.
pub async fn livekit_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<LiveKitWebhookResponse>, ApiError> {
    let event = if let Some(verifier) = &state.media_webhooks {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing LiveKit signature".into()))?;

        verifier.verify(&body, authorization).map_err(|e| {
            tracing::warn!(error = %e, "Invalid LiveKit webhook");
            ApiError::BadRequest(e.to_string())
        })?
    } else {
        tracing::warn!("LiveKit credentials not configured - skipping webhook verification");
        parse_webhook_event(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let room_name = event.room.as_ref().and_then(|r| r.name.as_deref());
    tracing::info!(event = %event.event, room_name = ?room_name, "Received LiveKit webhook");

    match (event.event.as_str(), room_name) {
        ("room_finished", Some(room_name)) => {
            state.ledger.close_room(room_name).await?;
        }
        _ => {
            tracing::debug!(event = %event.event, "Unhandled LiveKit event");
        }
    }

    Ok(Json(LiveKitWebhookResponse { status: "received" }))
}
