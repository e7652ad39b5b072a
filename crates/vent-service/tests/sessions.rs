//! Session lifecycle integration tests.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::TestHarness;
use vent_core::{Session, SessionId, SubscriptionStatus};
use vent_store::Store;

async fn start(harness: &TestHarness) -> serde_json::Value {
    let response = harness
        .server
        .post("/api/sessions/start")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;
    response.assert_status_ok();
    response.json()
}

async fn end(harness: &TestHarness, session_id: &str) -> StatusCode {
    harness
        .server
        .post(&format!("/api/sessions/{session_id}/end"))
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .status_code()
}

// ============================================================================
// Start
// ============================================================================

#[tokio::test]
async fn start_returns_media_grant() {
    let harness = TestHarness::new();

    let body = start(&harness).await;

    assert_eq!(body["resumed"], false);
    assert_eq!(body["livekit_url"], common::MEDIA_URL);
    let room_name = body["room_name"].as_str().unwrap();
    assert!(body["token"].as_str().unwrap().ends_with(room_name));
    assert!(body["session_id"].as_str().unwrap().parse::<SessionId>().is_ok());
}

#[tokio::test]
async fn second_start_resumes_open_session() {
    let harness = TestHarness::new();

    let first = start(&harness).await;
    let second = start(&harness).await;

    assert_eq!(first["session_id"], second["session_id"]);
    assert_eq!(second["resumed"], true);
}

#[tokio::test]
async fn active_sessions_lists_open_session() {
    let harness = TestHarness::new();
    let started = start(&harness).await;

    let response = harness
        .server
        .get("/api/sessions/active")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let sessions = body.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["session_id"], started["session_id"]);
    assert_eq!(sessions[0]["room_name"], started["room_name"]);
}

#[tokio::test]
async fn exhausted_plan_is_forbidden() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(3).await;
    harness
        .seed_subscription(harness.test_user_id, &plan, SubscriptionStatus::Active, 3)
        .await;

    let response = harness
        .server
        .post("/api/sessions/start")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "quota_exceeded");
    assert_eq!(body["error"]["details"]["remaining"], 0);
    assert_eq!(body["error"]["details"]["status"], "active");

    let open = harness
        .store
        .get_open_session(&harness.test_user_id)
        .await
        .unwrap();
    assert!(open.is_none());
}

#[tokio::test]
async fn start_is_unavailable_when_storage_is_down() {
    let harness = TestHarness::new();
    harness.store.set_offline(true);

    let response = harness
        .server
        .post("/api/sessions/start")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "unavailable");
}

#[tokio::test]
async fn start_dispatches_agent_and_end_releases_it() {
    let harness = TestHarness::new();
    let started = start(&harness).await;
    let room_name = started["room_name"].as_str().unwrap();
    assert!(harness.agents.in_room(room_name));

    end(&harness, started["session_id"].as_str().unwrap()).await;

    assert!(!harness.agents.in_room(room_name));
}

#[tokio::test]
async fn agent_outage_aborts_start_without_charge() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(5).await;
    let sub = harness
        .seed_subscription(harness.test_user_id, &plan, SubscriptionStatus::Active, 1)
        .await;
    harness.agents.set_down(true);

    let response = harness
        .server
        .post("/api/sessions/start")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let open = harness
        .store
        .get_open_session(&harness.test_user_id)
        .await
        .unwrap();
    assert!(open.is_none());
    let stored = harness
        .store
        .get_subscription(&sub.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.session_used, 1);
}

#[tokio::test]
async fn trial_session_deadline_is_the_remaining_trial() {
    let harness = TestHarness::new();
    let started = start(&harness).await;
    let session_id: SessionId = started["session_id"].as_str().unwrap().parse().unwrap();

    let session = harness.store.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.deadline_at - session.started_at, Duration::seconds(600));
}

#[tokio::test]
async fn media_outage_leaves_no_open_session() {
    let harness = TestHarness::new();
    harness.media.set_down(true);

    let response = harness
        .server
        .post("/api/sessions/start")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let open = harness
        .store
        .get_open_session(&harness.test_user_id)
        .await
        .unwrap();
    assert!(open.is_none());

    harness.media.set_down(false);
    let body = start(&harness).await;
    assert_eq!(body["resumed"], false);
}

// ============================================================================
// End
// ============================================================================

#[tokio::test]
async fn end_is_idempotent() {
    let harness = TestHarness::new();
    let started = start(&harness).await;
    let session_id = started["session_id"].as_str().unwrap();

    assert_eq!(end(&harness, session_id).await, StatusCode::OK);
    assert_eq!(end(&harness, session_id).await, StatusCode::OK);

    let open = harness
        .store
        .get_open_session(&harness.test_user_id)
        .await
        .unwrap();
    assert!(open.is_none());
}

#[tokio::test]
async fn ending_paid_session_counts_once() {
    let harness = TestHarness::new();
    let plan = harness.seed_plan(5).await;
    let sub = harness
        .seed_subscription(harness.test_user_id, &plan, SubscriptionStatus::Active, 1)
        .await;

    let started = start(&harness).await;
    let session_id = started["session_id"].as_str().unwrap();
    end(&harness, session_id).await;
    end(&harness, session_id).await;

    let stored = harness
        .store
        .get_subscription(&sub.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.session_used, 2);
}

#[tokio::test]
async fn ending_trial_session_spends_trial_seconds() {
    let harness = TestHarness::new();
    harness
        .server
        .post("/api/rooms/create")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .assert_status_ok();
    let room = harness
        .store
        .get_room_by_user(&harness.test_user_id)
        .await
        .unwrap()
        .unwrap();

    let mut session = Session::open(harness.test_user_id, room.id, None, Duration::seconds(600));
    session.started_at = Utc::now() - Duration::seconds(90);
    session.deadline_at = session.started_at + Duration::seconds(600);
    harness.store.open_session(&session).await.unwrap();

    assert_eq!(end(&harness, &session.id.to_string()).await, StatusCode::OK);

    let user = harness
        .store
        .get_user(&harness.test_user_id)
        .await
        .unwrap()
        .unwrap();
    assert!((90..=92).contains(&user.trial_seconds_used));

    let usage: serde_json::Value = harness
        .server
        .get("/api/payments/usage")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
        .json();
    assert_eq!(usage["status"], "trial");
    assert_eq!(usage["remaining"], 600 - user.trial_seconds_used);
}

#[tokio::test]
async fn ending_someone_elses_session_is_not_found() {
    let harness = TestHarness::new();
    let started = start(&harness).await;
    let session_id = started["session_id"].as_str().unwrap();

    let response = harness
        .server
        .post(&format!("/api/sessions/{session_id}/end"))
        .add_header(AUTHORIZATION, TestHarness::other_user_auth_header())
        .await;

    response.assert_status_not_found();
    let open = harness
        .store
        .get_open_session(&harness.test_user_id)
        .await
        .unwrap();
    assert!(open.is_some());
}

#[tokio::test]
async fn ending_unknown_session_is_not_found() {
    let harness = TestHarness::new();

    let unknown = SessionId::generate().to_string();
    assert_eq!(end(&harness, &unknown).await, StatusCode::NOT_FOUND);
    assert_eq!(end(&harness, "not-an-id").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn new_session_after_end() {
    let harness = TestHarness::new();
    let first = start(&harness).await;
    end(&harness, first["session_id"].as_str().unwrap()).await;

    let second = start(&harness).await;

    assert_ne!(first["session_id"], second["session_id"]);
    assert_eq!(second["resumed"], false);
}
