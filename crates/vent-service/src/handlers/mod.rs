//! API handlers.

pub mod admin;
pub mod health;
pub mod payments;
pub mod plans;
pub mod rooms;
pub mod sessions;
pub mod users;
pub mod webhooks;
