//! PostgreSQL store tests.
//!
//! These need a disposable database:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/vent_test cargo test -p vent-store -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use vent_core::{
    Plan, PlanId, Room, RoomCondition, Session, Subscription, SubscriptionStatus, User, UserId,
};
use vent_store::schema::constraint;
use vent_store::{PgStore, Store, UsageCharge};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgStore::connect(&url, 5, Duration::from_secs(5))
        .await
        .expect("connect")
}

fn max_session() -> chrono::Duration {
    chrono::Duration::hours(2)
}

fn plan() -> Plan {
    Plan {
        id: PlanId::generate(),
        name: "Monthly".into(),
        price_cents: 49_900,
        session_limit: 10,
        gateway_plan_id: format!("plan_{}", PlanId::generate()),
    }
}

async fn user_with_room(store: &PgStore) -> (User, Room) {
    let user = store
        .insert_user_if_absent(&User::new(UserId::generate()))
        .await
        .unwrap();
    let room = Room::new(user.id);
    store.insert_room(&room).await.unwrap();
    (user, room)
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn status_vocabulary_matches_schema() {
    let store = store().await;
    assert!(store.verify_status_vocabulary().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_room_reports_constraint_name() {
    let store = store().await;
    let (user, _) = user_with_room(&store).await;
    let err = store.insert_room(&Room::new(user.id)).await.unwrap_err();
    assert!(err.violates(constraint::ROOM_USER));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn partial_index_allows_one_open_session() {
    let store = store().await;
    let (user, room) = user_with_room(&store).await;

    let first = Session::open(user.id, room.id, None, max_session());
    store.open_session(&first).await.unwrap();
    let err = store
        .open_session(&Session::open(user.id, room.id, None, max_session()))
        .await
        .unwrap_err();
    assert!(err.violates(constraint::ONE_OPEN_SESSION));

    let closed = store
        .close_session(&first.id, Utc::now(), UsageCharge::TrialSeconds { seconds: 5 })
        .await
        .unwrap();
    assert!(closed.is_some());
    let room = store.get_room_by_user(&user.id).await.unwrap().unwrap();
    assert_eq!(room.condition, RoomCondition::Off);

    store
        .open_session(&Session::open(user.id, room.id, None, max_session()))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn racing_closers_charge_once() {
    let store = Arc::new(store().await);
    let (user, room) = user_with_room(&store).await;
    let plan = plan();
    store.upsert_plan(&plan).await.unwrap();
    let sub = Subscription::new(user.id, &plan, None, format!("sub_{}", user.id));
    store.insert_subscription(&sub).await.unwrap();

    let session = Session::open(user.id, room.id, Some(sub.id), max_session());
    store.open_session(&session).await.unwrap();

    let charge = UsageCharge::Sessions {
        subscription_id: sub.id,
        count: 1,
    };
    let session_id = session.id;
    let closers = (0..4).map(|_| {
        let store = Arc::clone(&store);
        async move { store.close_session(&session_id, Utc::now(), charge).await }
    });
    let winners = futures::future::join_all(closers)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Some(_))))
        .count();

    assert_eq!(winners, 1);
    let stored = store.get_subscription(&sub.id).await.unwrap().unwrap();
    assert_eq!(stored.session_used, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn overdue_listing_uses_session_deadline() {
    let store = store().await;
    let (user, room) = user_with_room(&store).await;
    let session = Session::open(user.id, room.id, None, chrono::Duration::seconds(30));
    store.open_session(&session).await.unwrap();

    let soon = Utc::now() + chrono::Duration::minutes(1);
    let overdue = store.list_overdue_sessions(soon, 1000).await.unwrap();
    assert!(overdue.iter().any(|s| s.id == session.id));
    let now = store.list_overdue_sessions(Utc::now(), 1000).await.unwrap();
    assert!(now.iter().all(|s| s.id != session.id));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn current_subscription_prefers_active_over_newer_pending() {
    let store = store().await;
    let (user, _) = user_with_room(&store).await;
    let plan = plan();
    store.upsert_plan(&plan).await.unwrap();

    let mut paid = Subscription::new(user.id, &plan, None, format!("sub_paid_{}", user.id));
    paid.status = SubscriptionStatus::Active;
    paid.created_at = Utc::now() - chrono::Duration::minutes(5);
    store.insert_subscription(&paid).await.unwrap();
    let pending = Subscription::new(user.id, &plan, None, format!("sub_pending_{}", user.id));
    store.insert_subscription(&pending).await.unwrap();

    let current = store.get_current_subscription(&user.id).await.unwrap().unwrap();
    assert_eq!(current.id, paid.id);
}
