//! Vent Client SDK.
//!
//! This crate provides a typed client for the vent API, as used by the mobile app.
//! Transient failures (gateway errors, 503s, connection failures) are retried with
//! bounded backoff; when retries run out the caller gets
//! [`ClientError::ServerOffline`].
//!
//! # Example
//!
//! ```no_run
//! use vent_client::VentClient;
//!
//! # async fn example() -> Result<(), vent_client::ClientError> {
//! let client = VentClient::new("https://api.vent.example", "user-access-token")?;
//!
//! let session = client.start_session().await?;
//! println!("Join {} at {}", session.room_name, session.livekit_url);
//!
//! // Safe to call more than once.
//! client.end_session(&session.session_id).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, VentClient};
pub use error::ClientError;
pub use types::*;
