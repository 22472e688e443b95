//! Power level authorization over live room state.
//!
//! Fetches the room's power levels content through a [`StateReader`] and
//! answers authorization queries with the pure arithmetic from
//! `palaver-core`. A room with no retrievable power levels event fails
//! with [`AuthzError::NoPowerLevelEvent`]; empty content is valid and
//! resolves through the protocol defaults. These functions never fall back
//! to a permissive answer on malformed input.

use crate::state_reader::{StateReadError, StateReader};
use palaver_core::{self as core, PowerLevelBounds};
use palaver_types::{event_type, PowerLevelAction, PowerLevelsContent};
use thiserror::Error;

/// Authorization query errors.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The room has no retrievable power levels event.
    #[error("room has no power level event")]
    NoPowerLevelEvent,

    /// The power levels content is not an object.
    #[error("malformed power levels content: {0}")]
    Malformed(String),

    /// The state read itself failed.
    #[error(transparent)]
    Read(#[from] StateReadError),
}

/// Fetch and decode a room's power levels content.
pub async fn power_levels_content<R: StateReader + ?Sized>(
    reader: &R,
    room_id: &str,
) -> Result<PowerLevelsContent, AuthzError> {
    let event = reader
        .get_room_state_event(room_id, event_type::POWER_LEVELS, "")
        .await?
        .ok_or(AuthzError::NoPowerLevelEvent)?;
    serde_json::from_value(serde_json::Value::Object(event.content))
        .map_err(|e| AuthzError::Malformed(e.to_string()))
}

/// Whether `user_id` may send events of the given type in the room.
pub async fn user_has_power_level_for<R: StateReader + ?Sized>(
    reader: &R,
    user_id: &str,
    room_id: &str,
    kind: &str,
    is_state: bool,
) -> Result<bool, AuthzError> {
    let content = power_levels_content(reader, room_id).await?;
    Ok(core::user_can_send(&content, user_id, kind, is_state))
}

/// Whether `user_id` may perform a named action in the room.
pub async fn user_has_power_level_for_action<R: StateReader + ?Sized>(
    reader: &R,
    user_id: &str,
    room_id: &str,
    action: PowerLevelAction,
) -> Result<bool, AuthzError> {
    let content = power_levels_content(reader, room_id).await?;
    Ok(core::user_can_perform(&content, user_id, action))
}

/// The legal bounds for `actor_id` changing `target_id`'s power level.
pub async fn power_level_change_bounds<R: StateReader + ?Sized>(
    reader: &R,
    actor_id: &str,
    target_id: &str,
    room_id: &str,
) -> Result<PowerLevelBounds, AuthzError> {
    let content = power_levels_content(reader, room_id).await?;
    Ok(core::power_level_change_bounds(&content, actor_id, target_id))
}
