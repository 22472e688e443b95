//! Power level authorization arithmetic.
//!
//! Pure functions over a room's [`PowerLevelsContent`] answering "can user X
//! do action Y" and "what is the legal range for user X to set user Y's
//! level". Fetching the content is the caller's job.
//!
//! All level reads go through [`coerce_level`]: a level that is not an
//! integer is treated as *absent* and falls through to the next default in
//! the chain. The chain always terminates in a protocol constant, so a
//! malformed level can lower what a user is granted but never raise it.

use palaver_types::{event_type, PowerLevelAction, PowerLevelsContent};
use serde_json::Value;

/// Default level required to send a state event when nothing is configured.
pub const STATE_DEFAULT: i64 = 50;

/// Default level required to send a timeline event when nothing is configured.
pub const EVENTS_DEFAULT: i64 = 0;

/// Default user level when nothing is configured.
pub const USERS_DEFAULT: i64 = 0;

/// Coerce a raw JSON level to an integer.
///
/// Only JSON integers pass. Strings (even numeric ones), booleans, floats
/// with a fractional part, null and absent values all coerce to `None`.
pub fn coerce_level(value: Option<&Value>) -> Option<i64> {
    value.and_then(Value::as_i64)
}

/// The effective level of a user: their `users` entry if numeric, else
/// `users_default` if numeric, else 0.
pub fn effective_user_level(content: &PowerLevelsContent, user_id: &str) -> i64 {
    coerce_level(content.users.get(user_id))
        .or_else(|| coerce_level(content.users_default.as_ref()))
        .unwrap_or(USERS_DEFAULT)
}

/// The level required to send an event of the given type.
///
/// `events[type]` if numeric, else the matching `state_default` /
/// `events_default` if numeric, else 50 for state events and 0 otherwise.
pub fn required_event_level(content: &PowerLevelsContent, kind: &str, is_state: bool) -> i64 {
    coerce_level(content.events.get(kind)).unwrap_or_else(|| {
        if is_state {
            coerce_level(content.state_default.as_ref()).unwrap_or(STATE_DEFAULT)
        } else {
            coerce_level(content.events_default.as_ref()).unwrap_or(EVENTS_DEFAULT)
        }
    })
}

/// The level required for a named action: the literal top-level field
/// (or `notifications.room`) if numeric, else 0.
pub fn required_action_level(content: &PowerLevelsContent, action: PowerLevelAction) -> i64 {
    coerce_level(content.action_level(action)).unwrap_or(0)
}

/// Whether `user_id` may send an event of the given type.
///
/// A level that fails numeric coercion can never satisfy the comparison;
/// it falls through the default chain, which only ever lowers the user's
/// granted level.
pub fn user_can_send(
    content: &PowerLevelsContent,
    user_id: &str,
    kind: &str,
    is_state: bool,
) -> bool {
    effective_user_level(content, user_id) >= required_event_level(content, kind, is_state)
}

/// Whether `user_id` may perform a named action.
pub fn user_can_perform(
    content: &PowerLevelsContent,
    user_id: &str,
    action: PowerLevelAction,
) -> bool {
    effective_user_level(content, user_id) >= required_action_level(content, action)
}

/// The legal range for an actor modifying a target user's power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLevelBounds {
    /// Whether the actor may change the target's level at all.
    pub can_modify: bool,
    /// The highest level the actor may legally assign.
    pub maximum_possible_level: i64,
}

/// Compute the legal bounds for `actor_id` changing `target_id`'s level.
///
/// Rules, in order:
/// - an actor below the level required to edit the power levels event
///   cannot modify anyone, and the legal ceiling is reported as 0;
/// - an actor may always set their own level up to its current value
///   (self-demotion or no-op);
/// - an actor strictly above the target may raise or lower the target,
///   but never above the actor's own level;
/// - otherwise the target is out of reach.
pub fn power_level_change_bounds(
    content: &PowerLevelsContent,
    actor_id: &str,
    target_id: &str,
) -> PowerLevelBounds {
    let actor_level = effective_user_level(content, actor_id);
    let target_level = effective_user_level(content, target_id);
    let required_to_edit = required_event_level(content, event_type::POWER_LEVELS, true);

    if actor_level < required_to_edit {
        return PowerLevelBounds {
            can_modify: false,
            maximum_possible_level: 0,
        };
    }
    if actor_id == target_id && actor_level >= target_level {
        return PowerLevelBounds {
            can_modify: true,
            maximum_possible_level: actor_level,
        };
    }
    if actor_level > target_level {
        return PowerLevelBounds {
            can_modify: true,
            maximum_possible_level: actor_level,
        };
    }
    PowerLevelBounds {
        can_modify: false,
        maximum_possible_level: actor_level,
    }
}
