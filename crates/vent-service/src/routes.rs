//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, health, payments, plans, rooms, sessions, users, webhooks};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for user API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum concurrent requests for operator endpoints.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 4;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /ping` - Liveness check
/// - `GET /config` - Client configuration
/// - `GET /api/plans` - List plans
///
/// ## Users and rooms (bearer auth)
/// - `GET /api/users/room` - Resolve/create the caller's room
/// - `POST /api/users/setup` - Complete onboarding
/// - `POST /api/rooms/create` - Create the caller's room (idempotent)
///
/// ## Sessions (bearer auth)
/// - `POST /api/sessions/start` - Start or resume a session
/// - `POST /api/sessions/:id/end` - End a session (idempotent)
/// - `GET /api/sessions/active` - List open sessions
///
/// ## Payments (bearer auth)
/// - `GET /api/payments/usage` - Usage status
/// - `POST /api/payments/create-subscription` - Start checkout
/// - `POST /api/payments/cancel-subscription` - Cancel at period end
///
/// ## Admin (`X-Admin-Key`)
/// - `PUT /admin/plans` - Upsert a plan
/// - `POST /admin/sweeps` - Run background sweeps now
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/razorpay` - Razorpay events
/// - `POST /livekit-webhook` - LiveKit events
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let api_routes = Router::new()
        // Users and rooms
        .route("/users/room", get(users::get_room))
        .route("/users/setup", post(users::setup))
        .route("/rooms/create", post(rooms::create_room))
        // Sessions
        .route("/sessions/start", post(sessions::start_session))
        .route("/sessions/active", get(sessions::active_sessions))
        .route("/sessions/:session_id/end", post(sessions::end_session))
        // Plans and payments
        .route("/plans", get(plans::list_plans))
        .route("/payments/usage", get(payments::usage))
        .route(
            "/payments/create-subscription",
            post(payments::create_subscription),
        )
        .route(
            "/payments/cancel-subscription",
            post(payments::cancel_subscription),
        )
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    let admin_routes = Router::new()
        .route("/plans", put(admin::upsert_plan))
        .route("/sweeps", post(admin::run_sweeps_now))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .route("/ping", get(health::ping))
        .route("/config", get(health::config))
        .nest("/api", api_routes)
        .nest("/admin", admin_routes)
        // Webhooks (no rate limit - controlled by external services)
        .route("/webhooks/razorpay", post(webhooks::razorpay_webhook))
        .route("/livekit-webhook", post(webhooks::livekit_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
