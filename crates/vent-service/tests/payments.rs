//! Usage, subscription and Razorpay webhook integration tests.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, StatusCode};
use chrono::{Duration, Utc};
use common::{TestHarness, EVENT_ID_HEADER, SIGNATURE_HEADER};
use serde_json::json;
use vent_core::{Subscription, SubscriptionStatus};
use vent_store::Store;

fn subscription_event(event: &str, gateway_subscription_id: &str, created_at: i64) -> String {
    json!({
        "entity": "event",
        "event": event,
        "payload": {
            "subscription": {
                "entity": {
                    "id": gateway_subscription_id,
                    "status": "active",
                    "current_start": created_at,
                    "current_end": created_at + 30 * 24 * 3600
                }
            }
        },
        "created_at": created_at
    })
    .to_string()
}

async fn deliver(harness: &TestHarness, body: &str, event_id: &str) -> serde_json::Value {
    let response = harness
        .server
        .post("/webhooks/razorpay")
        .add_header(SIGNATURE_HEADER, TestHarness::razorpay_signature(body))
        .add_header(EVENT_ID_HEADER, HeaderValue::from_str(event_id).unwrap())
        .text(body)
        .await;
    response.assert_status_ok();
    response.json()
}

// ============================================================================
// Plans and usage
// ============================================================================

#[tokio::test]
async fn plans_are_public() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(20).await;

    let response = harness.server.get("/api/plans").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let plans = body.as_array().unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0]["id"], plan.id.to_string());
    assert_eq!(plans[0]["session_limit"], 20);
}

#[tokio::test]
async fn new_user_sees_trial_usage() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/api/payments/usage")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "trial");
    assert_eq!(body["unit"], "seconds");
    assert_eq!(body["session_limit"], 600);
    assert_eq!(body["remaining"], 600);
    assert!(body["subscription_status"].is_null());
}

#[tokio::test]
async fn subscriber_sees_session_usage() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(10).await;
    harness
        .seed_subscription(harness.test_user_id, &plan, SubscriptionStatus::Active, 4)
        .await;

    let body: serde_json::Value = harness
        .server
        .get("/api/payments/usage")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();

    assert_eq!(body["status"], "active");
    assert_eq!(body["unit"], "sessions");
    assert_eq!(body["session_used"], 4);
    assert_eq!(body["remaining"], 6);
}

#[tokio::test]
async fn newer_pending_checkout_does_not_hide_paid_subscription() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(10).await;
    harness
        .seed_subscription(harness.test_user_id, &plan, SubscriptionStatus::Active, 2)
        .await;
    let mut pending = Subscription::new(harness.test_user_id, &plan, None, "sub_pending".into());
    pending.created_at = Utc::now() + Duration::seconds(5);
    harness.store.insert_subscription(&pending).await.unwrap();

    let body: serde_json::Value = harness
        .server
        .get("/api/payments/usage")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();

    assert_eq!(body["status"], "active");
    assert_eq!(body["remaining"], 8);

    harness
        .server
        .post("/api/sessions/start")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .assert_status_ok();
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn create_subscription_without_gateway_is_bad_gateway() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(10).await;

    let response = harness
        .server
        .post("/api/payments/create-subscription")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .json(&json!({ "plan_id": plan.id.to_string() }))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn create_subscription_rejects_malformed_plan() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/payments/create-subscription")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .json(&json!({ "plan_id": "gold" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_keeps_access_until_period_end() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(10).await;
    harness
        .seed_subscription(harness.test_user_id, &plan, SubscriptionStatus::Active, 0)
        .await;

    let response = harness
        .server
        .post("/api/payments/cancel-subscription")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "active");
    assert_eq!(body["cancel_at_period_end"], true);

    // Repeated cancellation is a no-op.
    harness
        .server
        .post("/api/payments/cancel-subscription")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn cancel_without_subscription_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/payments/cancel-subscription")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status_not_found();
}

// ============================================================================
// Razorpay webhooks
// ============================================================================

#[tokio::test]
async fn activation_webhook_grants_access() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(10).await;
    let sub = harness
        .seed_subscription(harness.test_user_id, &plan, SubscriptionStatus::Created, 0)
        .await;

    let body = subscription_event(
        "subscription.activated",
        &sub.gateway_subscription_id,
        Utc::now().timestamp(),
    );
    let result = deliver(&harness, &body, "evt_activate_1").await;

    assert_eq!(result["received"], true);
    assert_eq!(result["outcome"], "applied");
    let stored = harness.store.get_subscription(&sub.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert!(stored.next_billing_at.is_some());
}

#[tokio::test]
async fn redelivered_webhook_is_applied_once() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(10).await;
    let sub = harness
        .seed_subscription(harness.test_user_id, &plan, SubscriptionStatus::Created, 0)
        .await;
    let body = subscription_event(
        "subscription.activated",
        &sub.gateway_subscription_id,
        Utc::now().timestamp(),
    );

    let first = deliver(&harness, &body, "evt_dup").await;
    let second = deliver(&harness, &body, "evt_dup").await;

    assert_eq!(first["outcome"], "applied");
    assert_eq!(second["outcome"], "duplicate");
}

#[tokio::test]
async fn out_of_order_webhook_is_stale() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(10).await;
    let sub = harness
        .seed_subscription(harness.test_user_id, &plan, SubscriptionStatus::Created, 0)
        .await;
    let now = Utc::now();

    let activated = subscription_event(
        "subscription.activated",
        &sub.gateway_subscription_id,
        now.timestamp(),
    );
    deliver(&harness, &activated, "evt_new").await;

    let late = subscription_event(
        "subscription.pending",
        &sub.gateway_subscription_id,
        (now - Duration::hours(1)).timestamp(),
    );
    let result = deliver(&harness, &late, "evt_old").await;

    assert_eq!(result["outcome"], "stale");
    let stored = harness.store.get_subscription(&sub.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn webhook_for_unknown_subscription_is_acknowledged() {
    let harness = TestHarness::new();
    let body = subscription_event("subscription.charged", "sub_missing", Utc::now().timestamp());

    let result = deliver(&harness, &body, "evt_unknown").await;

    assert_eq!(result["outcome"], "unknown_subscription");
}

#[tokio::test]
async fn unhandled_webhook_is_acknowledged() {
    let harness = TestHarness::new();
    let body = json!({
        "event": "invoice.paid",
        "payload": {},
        "created_at": Utc::now().timestamp()
    })
    .to_string();

    let result = deliver(&harness, &body, "evt_invoice").await;

    assert_eq!(result["outcome"], "unhandled");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let harness = TestHarness::new();
    let body = subscription_event("subscription.charged", "sub_x", Utc::now().timestamp());

    let response = harness
        .server
        .post("/webhooks/razorpay")
        .add_header(SIGNATURE_HEADER, HeaderValue::from_static("deadbeef"))
        .text(&body)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_without_signature_is_rejected() {
    let harness = TestHarness::new();
    let body = subscription_event("subscription.charged", "sub_x", Utc::now().timestamp());

    let response = harness.server.post("/webhooks/razorpay").text(&body).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

// ============================================================================
// LiveKit webhooks
// ============================================================================

#[tokio::test]
async fn room_finished_closes_open_session_and_releases_agent() {
    let harness = TestHarness::new();
    let started: serde_json::Value = harness
        .server
        .post("/api/sessions/start")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();
    let room_name = started["room_name"].as_str().unwrap();
    assert!(harness.agents.in_room(room_name));

    let body = json!({
        "event": "room_finished",
        "id": "EV_1",
        "room": { "name": started["room_name"], "sid": "RM_1" }
    })
    .to_string();
    let response = harness.server.post("/livekit-webhook").text(&body).await;

    response.assert_status_ok();
    let open = harness
        .store
        .get_open_session(&harness.test_user_id)
        .await
        .unwrap();
    assert!(open.is_none());
    assert!(!harness.agents.in_room(room_name));
}

#[tokio::test]
async fn other_livekit_events_are_acknowledged() {
    let harness = TestHarness::new();
    let body = json!({ "event": "participant_joined", "room": { "name": "room_x" } }).to_string();

    let response = harness.server.post("/livekit-webhook").text(&body).await;

    response.assert_status_ok();
    let result: serde_json::Value = response.json();
    assert_eq!(result["status"], "received");
}
