//! Room registry.
//!
//! Owns the user to room mapping. Users and rooms are created lazily on first
//! authenticated use, as explicit calls in the request path.

use std::sync::Arc;
use std::time::Duration;

use vent_core::{Onboarding, Room, User, UserId, VentError};
use vent_store::schema::constraint;
use vent_store::Store;

use crate::deadline::{bounded, within};

/// Resolves users and their rooms.
#[derive(Clone)]
pub struct RoomRegistry {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl RoomRegistry {
    /// Create a registry over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Ensure the user and their room exist, returning both.
    pub async fn ensure_user(&self, user_id: UserId) -> Result<(User, Room), VentError> {
        let user = match bounded(self.timeout, self.store.get_user(&user_id)).await? {
            Some(user) => user,
            None => {
                let user =
                    bounded(self.timeout, self.store.insert_user_if_absent(&User::new(user_id)))
                        .await?;
                tracing::info!(user_id = %user_id, "User created");
                user
            }
        };

        let room = self.get_or_create_room(user_id).await?;
        Ok((user, room))
    }

    /// Return the user's room, creating it if needed.
    ///
    /// Safe under concurrent first calls: the loser of a creation race reads back the
    /// winner's room.
    pub async fn get_or_create_room(&self, user_id: UserId) -> Result<Room, VentError> {
        if let Some(room) = bounded(self.timeout, self.store.get_room_by_user(&user_id)).await? {
            return Ok(room);
        }

        let room = Room::new(user_id);
        match within(self.timeout, self.store.insert_room(&room)).await? {
            Ok(()) => {
                tracing::info!(user_id = %user_id, room_name = %room.room_name, "Room created");
                Ok(room)
            }
            Err(e) if e.violates(constraint::ROOM_USER) || e.violates(constraint::ROOM_NAME) => {
                tracing::debug!(user_id = %user_id, "Room creation race lost, reading back");
                bounded(self.timeout, self.store.get_room_by_user(&user_id))
                    .await?
                    .ok_or_else(|| {
                        tracing::error!(
                            user_id = %user_id,
                            error = %e,
                            "Room constraint violated but no room owned by user"
                        );
                        VentError::Internal("room uniqueness violated by another owner".into())
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a room by its media-server name.
    pub async fn find_by_name(&self, room_name: &str) -> Result<Option<Room>, VentError> {
        bounded(self.timeout, self.store.get_room_by_name(room_name)).await
    }

    /// Complete onboarding with the given profile.
    pub async fn complete_setup(
        &self,
        user_id: UserId,
        name: &str,
        age: Option<i32>,
    ) -> Result<(User, Room), VentError> {
        let (_, room) = self.ensure_user(user_id).await?;
        let user = bounded(
            self.timeout,
            self.store
                .update_user_profile(&user_id, name, age, Onboarding::Done),
        )
        .await?;
        tracing::info!(user_id = %user_id, "User setup complete");
        Ok((user, room))
    }
}
