//! Core types for vent.
//!
//! This crate holds the domain model of the vent backend, free of I/O:
//!
//! - **Identifiers**: `UserId`, `RoomId`, `SessionId`, `PlanId`, `SubscriptionId`
//! - **Users and rooms**: `User`, `Room`, `RoomCondition`
//! - **Sessions**: `Session`, `SessionState`
//! - **Billing**: `Plan`, `Subscription`, `SubscriptionStatus`, `BillingEvent`, `Transition`
//! - **Quota**: `Quota`, `QuotaPolicy`, `QuotaStatus`
//!
//! # Metering
//!
//! Paid plans count sessions: every closed session adds one to `session_used`.
//! The trial counts seconds: every closed trial session adds its elapsed time,
//! capped at the maximum session duration, to `trial_seconds_used`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod plan;
pub mod room;
pub mod session;
pub mod subscription;
pub mod usage;
pub mod user;

pub use error::{Result, VentError};
pub use ids::{IdError, PlanId, RoomId, SessionId, SubscriptionId, UserId};
pub use plan::Plan;
pub use room::{Room, RoomCondition};
pub use session::{Session, SessionState};
pub use subscription::{
    BillingEvent, BillingEventKind, Renewal, Subscription, SubscriptionStatus, Transition,
    UnknownStatus, STATUS_VOCABULARY_VERSION,
};
pub use usage::{Quota, QuotaPolicy, QuotaStatus, DEFAULT_TRIAL_SECONDS};
pub use user::{Onboarding, User, DEFAULT_DISPLAY_NAME};
