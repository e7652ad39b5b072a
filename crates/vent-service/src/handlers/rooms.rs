//! Room handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Created (or existing) room.
#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    /// Room ID.
    pub room_id: String,
    /// Media-server room name.
    pub room_name: String,
}

/// Create the caller's room. Returns the existing room if there is one.
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    let (_, room) = state.rooms.ensure_user(auth.user_id).await?;
    Ok(Json(CreateRoomResponse {
        room_id: room.id.to_string(),
        room_name: room.room_name,
    }))
}
