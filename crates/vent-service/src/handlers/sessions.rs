//! Session handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use vent_core::{RoomCondition, SessionId};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::{EndOutcome, StartedSession};
use crate::state::AppState;

/// Session start response.
#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    /// Session ID.
    pub session_id: String,
    /// Media-server room name.
    pub room_name: String,
    /// Media access token.
    pub token: String,
    /// Media server URL.
    pub livekit_url: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// Whether an already open session was returned.
    pub resumed: bool,
}

impl From<StartedSession> for StartSessionResponse {
    fn from(started: StartedSession) -> Self {
        Self {
            session_id: started.session.id.to_string(),
            room_name: started.room.room_name,
            token: started.grant.token,
            livekit_url: started.grant.url,
            expires_at: started.grant.expires_at,
            started_at: started.session.started_at,
            resumed: started.resumed,
        }
    }
}

/// Start a session, or resume the caller's open one.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let started = state.ledger.start_or_resume(auth.user_id).await?;
    Ok(Json(started.into()))
}

/// End a session. Ending a closed session succeeds.
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session_id: SessionId = session_id
        .parse()
        .map_err(|_| ApiError::NotFound(format!("session not found: {session_id}")))?;

    let outcome = state.ledger.end(auth.user_id, session_id).await?;
    if outcome == EndOutcome::AlreadyClosed {
        tracing::debug!(session_id = %session_id, "End of closed session acknowledged");
    }
    Ok(StatusCode::OK)
}

/// An open session.
#[derive(Debug, Serialize)]
pub struct ActiveSessionResponse {
    /// Session ID.
    pub session_id: String,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// Media-server room name.
    pub room_name: String,
    /// Room condition.
    pub room_condition: RoomCondition,
}

/// List the caller's open sessions.
pub async fn active_sessions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<ActiveSessionResponse>>, ApiError> {
    let sessions = state.ledger.active_sessions(auth.user_id).await?;
    if sessions.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let (_, room) = state.rooms.ensure_user(auth.user_id).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| ActiveSessionResponse {
                session_id: s.id.to_string(),
                started_at: s.started_at,
                room_name: room.room_name.clone(),
                room_condition: room.condition,
            })
            .collect(),
    ))
}
