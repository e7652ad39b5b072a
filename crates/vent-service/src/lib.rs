//! Vent HTTP API service.
//!
//! This crate provides the HTTP API of the vent backend:
//!
//! - Room registry: one durable media room per user, created lazily
//! - Session ledger: single open session per user, idempotent end, reaping
//! - Usage meter: per-plan session allowance, trial seconds otherwise
//! - Subscriptions: Razorpay checkout, webhooks and scheduled renewals
//! - Media access: LiveKit tokens scoped to one room and one identity
//! - Agent dispatch: the conversation agent joins each running session's room
//!
//! # Authentication
//!
//! 1. **Bearer tokens** - HS256 JWTs from the identity provider, for end users
//! 2. **Admin key** - `X-Admin-Key`, for operator endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod agent;
pub mod auth;
pub mod billing;
pub mod config;
pub mod crypto;
pub mod deadline;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod ledger;
pub mod media;
pub mod meter;
pub mod rooms;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use agent::{AgentDispatch, AgentDispatcher, AgentError, LiveKitAgentDispatcher};
pub use config::ServiceConfig;
pub use error::ApiError;
pub use gateway::{GatewayError, RazorpayClient};
pub use media::{LiveKitIssuer, MediaError, MediaGrant, MediaIssuer};
pub use routes::create_router;
pub use state::AppState;
