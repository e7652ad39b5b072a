//! Razorpay integration for subscriptions.
//!
//! Razorpay handles:
//! - Customer registration
//! - Recurring subscriptions and hosted checkout
//! - Webhooks for subscription lifecycle events

pub mod client;
pub mod types;
pub mod webhook;

pub use client::{GatewayError, RazorpayClient};
pub use types::*;
