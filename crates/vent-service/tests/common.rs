//! Common test utilities for vent integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use vent_core::{Plan, PlanId, Subscription, SubscriptionStatus, UserId};
use vent_service::crypto::hmac_sha256_hex;
use vent_service::{
    create_router, AgentDispatch, AgentDispatcher, AgentError, AppState, MediaError, MediaGrant,
    MediaIssuer, ServiceConfig,
};
use vent_store::{MemoryStore, Store};

/// Secret the test identity provider signs bearer tokens with.
pub const JWT_SECRET: &str = "test-jwt-secret";

/// Operator key.
pub const ADMIN_KEY: &str = "test-admin-key";

/// Razorpay webhook secret.
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Operator key header.
pub const ADMIN_KEY_HEADER: HeaderName = HeaderName::from_static("x-admin-key");

/// Razorpay signature header.
pub const SIGNATURE_HEADER: HeaderName = HeaderName::from_static("x-razorpay-signature");

/// Razorpay event ID header.
pub const EVENT_ID_HEADER: HeaderName = HeaderName::from_static("x-razorpay-event-id");

/// Media server URL handed out by the stub issuer.
pub const MEDIA_URL: &str = "wss://media.test";

/// Media issuer that signs nothing and can be switched off.
#[derive(Default)]
pub struct StubMedia {
    down: AtomicBool,
}

impl StubMedia {
    /// Make token issuing fail until switched back.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaIssuer for StubMedia {
    async fn issue_token(
        &self,
        user_id: &UserId,
        room_name: &str,
    ) -> Result<MediaGrant, MediaError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(MediaError::Unavailable("stub media down".into()));
        }
        Ok(MediaGrant {
            token: format!("media:{user_id}:{room_name}"),
            url: MEDIA_URL.into(),
            expires_at: Utc::now() + Duration::minutes(10),
        })
    }

    fn server_url(&self) -> &str {
        MEDIA_URL
    }
}

/// Agent dispatcher that remembers which rooms have the agent.
#[derive(Default)]
pub struct StubAgents {
    rooms: Mutex<HashSet<String>>,
    down: AtomicBool,
}

impl StubAgents {
    /// Make dispatching fail until switched back.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Whether the agent is currently dispatched to `room_name`.
    pub fn in_room(&self, room_name: &str) -> bool {
        self.rooms.lock().expect("agents lock").contains(room_name)
    }
}

#[async_trait]
impl AgentDispatcher for StubAgents {
    async fn dispatch(&self, room_name: &str) -> Result<AgentDispatch, AgentError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(AgentError::Api {
                status: 503,
                message: "stub agents down".into(),
            });
        }
        self.rooms
            .lock()
            .expect("agents lock")
            .insert(room_name.to_string());
        Ok(AgentDispatch {
            id: format!("AD_{room_name}"),
            agent_name: "vent-agent".into(),
            room: room_name.to_string(),
        })
    }

    async fn release(&self, room_name: &str) -> Result<usize, AgentError> {
        let removed = self.rooms.lock().expect("agents lock").remove(room_name);
        Ok(usize::from(removed))
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The backing store, for seeding and inspection.
    pub store: Arc<MemoryStore>,
    /// The media issuer stub.
    pub media: Arc<StubMedia>,
    /// The agent dispatcher stub.
    pub agents: Arc<StubAgents>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness with a fresh store.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness, adjusting the default test configuration first.
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            admin_api_key: Some(ADMIN_KEY.into()),
            razorpay_webhook_secret: Some(WEBHOOK_SECRET.into()),
            store_timeout_ms: 500,
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let store = Arc::new(MemoryStore::new());
        let media = Arc::new(StubMedia::default());
        let agents = Arc::new(StubAgents::default());
        let state = AppState::with_providers(store.clone(), config, media.clone(), agents.clone());
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            media,
            agents,
            test_user_id: UserId::generate(),
        }
    }

    /// Mint a bearer token the service accepts for `user_id`.
    pub fn token_for(user_id: &UserId) -> String {
        let claims = json!({
            "sub": user_id.to_string(),
            "aud": "authenticated",
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
            "email": "caller@example.com",
        });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to sign test token")
    }

    /// Authorization header value for the test user.
    pub fn user_auth_header(&self) -> HeaderValue {
        Self::auth_header_for(&self.test_user_id)
    }

    /// Authorization header value for any user.
    pub fn auth_header_for(user_id: &UserId) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", Self::token_for(user_id)))
            .expect("Invalid header value")
    }

    /// Authorization header value for a fresh, different user.
    pub fn other_user_auth_header() -> HeaderValue {
        Self::auth_header_for(&UserId::generate())
    }

    /// Admin key header value.
    pub fn admin_key() -> HeaderValue {
        HeaderValue::from_static(ADMIN_KEY)
    }

    /// Signature header value for a Razorpay webhook body.
    pub fn razorpay_signature(body: &str) -> HeaderValue {
        let sig = hmac_sha256_hex(WEBHOOK_SECRET, body).expect("Failed to sign body");
        HeaderValue::from_str(&sig).expect("Invalid header value")
    }

    /// Store a plan.
    pub async fn seed_plan(&self, session_limit: i64) -> Plan {
        let plan = Plan {
            id: PlanId::generate(),
            name: format!("{session_limit} sessions"),
            price_cents: 49_900,
            session_limit,
            gateway_plan_id: format!("plan_{}", PlanId::generate()),
        };
        self.store.upsert_plan(&plan).await.expect("Failed to seed plan");
        plan
    }

    /// Store a subscription for `user_id` in the given state.
    pub async fn seed_subscription(
        &self,
        user_id: UserId,
        plan: &Plan,
        status: SubscriptionStatus,
        session_used: i64,
    ) -> Subscription {
        let mut sub = Subscription::new(user_id, plan, None, format!("sub_{user_id}"));
        sub.status = status;
        sub.session_used = session_used;
        self.store
            .insert_subscription(&sub)
            .await
            .expect("Failed to seed subscription");
        sub
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
