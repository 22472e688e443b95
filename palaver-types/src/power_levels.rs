//! Room power levels content.
//!
//! Levels are kept as raw JSON values rather than integers: servers and
//! room admins have been observed setting string levels like `"50"`, and
//! the authorization rules must treat those as *absent* rather than parse
//! them. The numeric coercion lives in `palaver-core`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The `notifications` block of the power levels content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotificationLevels {
    /// Level required to send an `@room` notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Value>,
}

/// Content of the `m.room.power_levels` state event.
///
/// An entirely empty content is valid and resolves through the protocol
/// defaults; that is distinct from the power levels event being absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PowerLevelsContent {
    /// Level required to ban a user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban: Option<Value>,

    /// Level required to kick a user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kick: Option<Value>,

    /// Level required to invite a user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite: Option<Value>,

    /// Level required to redact another user's event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact: Option<Value>,

    /// Default level required to send state events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_default: Option<Value>,

    /// Default level required to send timeline events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_default: Option<Value>,

    /// Default level of users not listed in `users`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users_default: Option<Value>,

    /// Per-event-type level overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub events: BTreeMap<String, Value>,

    /// Per-user level assignments.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub users: BTreeMap<String, Value>,

    /// Notification level requirements.
    #[serde(default)]
    pub notifications: NotificationLevels,
}

/// A named action with a top-level power level requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerLevelAction {
    /// Ban a user from the room.
    Ban,
    /// Kick a user from the room.
    Kick,
    /// Invite a user to the room.
    Invite,
    /// Redact another user's event.
    Redact,
    /// Send an `@room` notification.
    NotifyRoom,
}

impl PowerLevelsContent {
    /// The raw level value configured for a named action, when present.
    pub fn action_level(&self, action: PowerLevelAction) -> Option<&Value> {
        match action {
            PowerLevelAction::Ban => self.ban.as_ref(),
            PowerLevelAction::Kick => self.kick.as_ref(),
            PowerLevelAction::Invite => self.invite.as_ref(),
            PowerLevelAction::Redact => self.redact.as_ref(),
            PowerLevelAction::NotifyRoom => self.notifications.room.as_ref(),
        }
    }
}
