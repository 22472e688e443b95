//! Wire shapes for the long-poll sync endpoint and sync filters.
//!
//! Every field is `serde(default)`-tolerant: servers omit empty sections
//! rather than sending empty objects, and a missing section means "nothing
//! changed".

use crate::event::RawEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A sync filter definition. Opaque to the engine; compared by content.
pub type FilterDefinition = Value;

/// A server-registered filter with its cached definition.
///
/// The id is only reusable while the cached definition still equals the
/// desired one (content equality, not identity).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedFilter {
    /// The server-assigned filter id.
    pub id: String,
    /// The definition the id was created for.
    pub definition: FilterDefinition,
}

/// A list of events, as nested under `events` keys on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventContainer {
    /// The events in this container.
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// The timeline section of a synced room.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    /// Timeline events, oldest first.
    #[serde(default)]
    pub events: Vec<RawEvent>,

    /// Whether the server truncated the timeline.
    #[serde(default)]
    pub limited: bool,

    /// Token for paginating further back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_batch: Option<String>,
}

/// A state event block (`state` or `invite_state`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateBlock {
    /// The state events in this block.
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// A room the user has joined.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JoinedRoom {
    /// New timeline events.
    #[serde(default)]
    pub timeline: Timeline,

    /// State delta since the previous sync.
    #[serde(default)]
    pub state: StateBlock,

    /// Per-room account data.
    #[serde(default)]
    pub account_data: EventContainer,
}

/// A room the user has left or been banned from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LeftRoom {
    /// Timeline events up to and including the leave.
    #[serde(default)]
    pub timeline: Timeline,

    /// Per-room account data.
    #[serde(default)]
    pub account_data: EventContainer,
}

/// A room the user has been invited to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InvitedRoom {
    /// Stripped state events describing the invite.
    #[serde(default)]
    pub invite_state: StateBlock,
}

/// The per-membership room sections of a sync response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rooms {
    /// Rooms currently joined.
    #[serde(default)]
    pub join: BTreeMap<String, JoinedRoom>,

    /// Rooms left or banned from.
    #[serde(default)]
    pub leave: BTreeMap<String, LeftRoom>,

    /// Rooms invited to.
    #[serde(default)]
    pub invite: BTreeMap<String, InvitedRoom>,
}

/// Device list deltas for encryption key tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceLists {
    /// Users whose device lists changed.
    #[serde(default)]
    pub changed: Vec<String>,

    /// Users who no longer share an encrypted room.
    #[serde(default)]
    pub left: Vec<String>,
}

/// A full response from the long-poll sync endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncResponse {
    /// The cursor to pass as `since` on the next request.
    pub next_batch: String,

    /// Room sections keyed by membership.
    #[serde(default)]
    pub rooms: Rooms,

    /// Global account data events.
    #[serde(default)]
    pub account_data: EventContainer,

    /// To-device messages for the encryption engine.
    #[serde(default)]
    pub to_device: EventContainer,

    /// Remaining one-time key counts per algorithm.
    #[serde(default)]
    pub device_one_time_keys_count: BTreeMap<String, u64>,

    /// Fallback key algorithms that still have an unused key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_unused_fallback_key_types: Option<Vec<String>>,

    /// Device list deltas.
    #[serde(default)]
    pub device_lists: DeviceLists,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_response_deserializes() {
        let response: SyncResponse =
            serde_json::from_value(json!({"next_batch": "s1"})).unwrap();
        assert_eq!(response.next_batch, "s1");
        assert!(response.rooms.join.is_empty());
        assert!(response.account_data.events.is_empty());
        assert!(response.device_unused_fallback_key_types.is_none());
    }

    #[test]
    fn full_response_deserializes() {
        let response: SyncResponse = serde_json::from_value(json!({
            "next_batch": "s2",
            "rooms": {
                "join": {
                    "!a:x.org": {
                        "timeline": {
                            "events": [{
                                "sender": "@a:x.org",
                                "type": "m.room.message",
                                "event_id": "$1",
                                "content": {"msgtype": "m.text", "body": "hi"}
                            }],
                            "limited": true,
                            "prev_batch": "p1"
                        },
                        "state": {"events": []},
                        "account_data": {"events": []}
                    }
                },
                "leave": {"!b:x.org": {"timeline": {"events": []}}},
                "invite": {"!c:x.org": {"invite_state": {"events": []}}}
            },
            "device_one_time_keys_count": {"signed_curve25519": 42},
            "device_unused_fallback_key_types": ["signed_curve25519"],
            "device_lists": {"changed": ["@b:x.org"], "left": []}
        }))
        .unwrap();

        let joined = response.rooms.join.get("!a:x.org").unwrap();
        assert_eq!(joined.timeline.events.len(), 1);
        assert!(joined.timeline.limited);
        assert!(response.rooms.leave.contains_key("!b:x.org"));
        assert!(response.rooms.invite.contains_key("!c:x.org"));
        assert_eq!(
            response.device_one_time_keys_count.get("signed_curve25519"),
            Some(&42)
        );
        assert_eq!(response.device_lists.changed, vec!["@b:x.org"]);
    }

    #[test]
    fn cached_filter_compares_by_definition_content() {
        let a = CachedFilter {
            id: "1".into(),
            definition: json!({"room": {"timeline": {"limit": 20}}}),
        };
        let same_definition = json!({"room": {"timeline": {"limit": 20}}});
        let different = json!({"room": {"timeline": {"limit": 10}}});
        assert_eq!(a.definition, same_definition);
        assert_ne!(a.definition, different);
    }
}
