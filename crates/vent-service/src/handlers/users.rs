//! User handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use vent_core::{Room, RoomCondition};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Longest accepted display name.
const MAX_NAME_CHARS: usize = 80;

/// A user's room.
#[derive(Debug, Serialize)]
pub struct RoomResponse {
    /// Room ID.
    pub room_id: String,
    /// Media-server room name.
    pub room_name: String,
    /// Whether a session is running.
    pub room_condition: RoomCondition,
}

impl From<&Room> for RoomResponse {
    fn from(room: &Room) -> Self {
        Self {
            room_id: room.id.to_string(),
            room_name: room.room_name.clone(),
            room_condition: room.condition,
        }
    }
}

/// Resolve (creating on first use) the caller's room.
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<RoomResponse>, ApiError> {
    let (_, room) = state.rooms.ensure_user(auth.user_id).await?;
    Ok(Json(RoomResponse::from(&room)))
}

/// Profile setup request.
#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    /// Display name.
    pub name: String,
    /// Age, optional.
    #[serde(default)]
    pub age: Option<i32>,
}

/// Profile setup response.
#[derive(Debug, Serialize)]
pub struct SetupResponse {
    /// User ID.
    pub user_id: String,
    /// Room ID.
    pub room_id: String,
    /// Media-server room name.
    pub room_name: String,
    /// Always `setup_complete`.
    pub status: &'static str,
}

/// Complete onboarding.
pub async fn setup(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SetupRequest>,
) -> Result<Json<SetupResponse>, ApiError> {
    let name = body.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return Err(ApiError::BadRequest(format!(
            "name must be 1-{MAX_NAME_CHARS} characters"
        )));
    }
    if body.age.is_some_and(|age| !(1..=150).contains(&age)) {
        return Err(ApiError::BadRequest("age out of range".into()));
    }

    let (user, room) = state
        .rooms
        .complete_setup(auth.user_id, name, body.age)
        .await?;

    Ok(Json(SetupResponse {
        user_id: user.id.to_string(),
        room_id: room.id.to_string(),
        room_name: room.room_name,
        status: "setup_complete",
    }))
}
