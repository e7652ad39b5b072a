//! Razorpay webhook parsing.
//!
//! Translates gateway events into [`BillingEvent`]s. Event types with no billing
//! meaning parse to `None` and are acknowledged without further processing.

use chrono::{DateTime, TimeZone, Utc};

use vent_core::{BillingEvent, BillingEventKind};

use super::client::GatewayError;
use super::types::WebhookEnvelope;
use crate::crypto::verify_hmac_sha256_hex;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Header carrying the unique event ID.
pub const EVENT_ID_HEADER: &str = "x-razorpay-event-id";

/// Verify the hex HMAC-SHA256 signature of a webhook body.
///
/// # Errors
///
/// Returns `GatewayError::InvalidSignature` if the signature does not match.
pub fn verify_signature(secret: &str, body: &str, signature: &str) -> Result<(), GatewayError> {
    if verify_hmac_sha256_hex(secret, body, signature) {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature)
    }
}

/// Map a gateway event name to a billing event kind.
#[must_use]
pub fn event_kind(event: &str) -> Option<BillingEventKind> {
    match event {
        "subscription.activated" => Some(BillingEventKind::Activated),
        "subscription.charged" => Some(BillingEventKind::Charged),
        "subscription.pending" | "subscription.halted" | "payment.failed" => {
            Some(BillingEventKind::ChargeFailed)
        }
        "subscription.paused" => Some(BillingEventKind::Paused),
        "subscription.resumed" => Some(BillingEventKind::Resumed),
        "subscription.cancelled" | "subscription.completed" => Some(BillingEventKind::Cancelled),
        _ => None,
    }
}

/// Parse a webhook body into a billing event.
///
/// `event_id` is the value of the event ID header; without one an ID is derived
/// from the event name, entity and timestamp, which is stable across redeliveries.
///
/// # Errors
///
/// Returns `GatewayError::Serialization` if the body is not a webhook envelope.
pub fn parse_event(
    body: &str,
    event_id: Option<&str>,
) -> Result<Option<BillingEvent>, GatewayError> {
    let envelope: WebhookEnvelope = serde_json::from_str(body)?;

    let Some(kind) = event_kind(&envelope.event) else {
        return Ok(None);
    };

    let subscription = envelope.payload.subscription.map(|w| w.entity);
    let payment = envelope.payload.payment.map(|w| w.entity);

    let gateway_subscription_id = subscription
        .as_ref()
        .map(|s| s.id.clone())
        .or_else(|| payment.as_ref().and_then(|p| p.subscription_id.clone()));

    let Some(gateway_subscription_id) = gateway_subscription_id else {
        // One-off payment failures carry no subscription.
        tracing::debug!(event = %envelope.event, "Webhook without subscription reference");
        return Ok(None);
    };

    let occurred_at = timestamp(envelope.created_at).unwrap_or_else(Utc::now);

    let event_id = event_id.filter(|id| !id.is_empty()).map_or_else(
        || {
            format!(
                "{}:{}:{}",
                envelope.event, gateway_subscription_id, envelope.created_at
            )
        },
        ToString::to_string,
    );

    let (period_start, period_end) = subscription.as_ref().map_or((None, None), |s| {
        (
            s.current_start.and_then(timestamp),
            s.current_end.and_then(timestamp),
        )
    });

    let (payment_id, amount_cents) = match (&payment, kind) {
        (Some(p), BillingEventKind::Charged) => (Some(p.id.clone()), p.amount),
        _ => (None, None),
    };

    Ok(Some(BillingEvent {
        event_id,
        kind,
        gateway_subscription_id,
        occurred_at,
        payment_id,
        amount_cents,
        period_start,
        period_end,
    }))
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hmac_sha256_hex;

    const CHARGED: &str = r#"{
        "entity": "event",
        "event": "subscription.charged",
        "contains": ["subscription", "payment"],
        "payload": {
            "subscription": {"entity": {
                "id": "sub_123", "plan_id": "plan_m", "status": "active",
                "current_start": 1735689600, "current_end": 1738368000
            }},
            "payment": {"entity": {"id": "pay_9", "amount": 49900, "status": "captured"}}
        },
        "created_at": 1735689700
    }"#;

    #[test]
    fn charged_event_carries_payment_and_period() {
        let event = parse_event(CHARGED, Some("evt_1")).unwrap().unwrap();
        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.kind, BillingEventKind::Charged);
        assert_eq!(event.gateway_subscription_id, "sub_123");
        assert_eq!(event.payment_id.as_deref(), Some("pay_9"));
        assert_eq!(event.amount_cents, Some(49900));
        assert_eq!(event.period_start.unwrap().timestamp(), 1_735_689_600);
        assert_eq!(event.period_end.unwrap().timestamp(), 1_738_368_000);
        assert_eq!(event.occurred_at.timestamp(), 1_735_689_700);
    }

    #[test]
    fn missing_event_id_is_derived_deterministically() {
        let a = parse_event(CHARGED, None).unwrap().unwrap();
        let b = parse_event(CHARGED, Some("")).unwrap().unwrap();
        assert_eq!(a.event_id, "subscription.charged:sub_123:1735689700");
        assert_eq!(a.event_id, b.event_id);
    }

    #[test]
    fn halted_is_a_charge_failure() {
        let body = r#"{"event":"subscription.halted","payload":{"subscription":{"entity":{"id":"sub_1"}}},"created_at":1}"#;
        let event = parse_event(body, None).unwrap().unwrap();
        assert_eq!(event.kind, BillingEventKind::ChargeFailed);
        assert!(event.payment_id.is_none());
    }

    #[test]
    fn payment_failure_without_subscription_is_ignored() {
        let body = r#"{"event":"payment.failed","payload":{"payment":{"entity":{"id":"pay_1"}}},"created_at":1}"#;
        assert!(parse_event(body, None).unwrap().is_none());
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let body = r#"{"event":"order.paid","payload":{},"created_at":1}"#;
        assert!(parse_event(body, None).unwrap().is_none());
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(matches!(
            parse_event("not json", None),
            Err(GatewayError::Serialization(_))
        ));
    }

    #[test]
    fn signature_round_trip() {
        let sig = hmac_sha256_hex("whsec", CHARGED).unwrap();
        assert!(verify_signature("whsec", CHARGED, &sig).is_ok());
        assert!(verify_signature("other", CHARGED, &sig).is_err());
    }
}
