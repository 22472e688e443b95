//! Room upgrade chain traversal.
//!
//! Room upgrades link rooms through `m.room.create` (`predecessor`) and
//! `m.room.tombstone` (`replacement_room`) state events. This module walks
//! those links in both directions from a starting room, validating that
//! each step's back-reference agrees with the path used to reach it.
//!
//! A link whose back-reference disagrees is untrusted: the room is still
//! reported, but its `ref_event_id` is `None`. Revisiting any room already
//! seen in the walk (including the starting room) appends it once as a
//! cycle terminator and stops. A referenced room with no readable state is
//! a dead end and is not appended.

use crate::state_reader::{StateReadError, StateReader};
use palaver_types::{event_type, RawEvent};
use serde_json::Value;
use std::collections::HashSet;

/// One step in an upgrade chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomUpgradeLink {
    /// The room at this step.
    pub room_id: String,
    /// The room version reported by its create event ("1" when unset).
    pub version: String,
    /// The event id of the link event pointing along the walk direction,
    /// when that link agrees with the path; `None` for untrusted or
    /// terminal links.
    pub ref_event_id: Option<String>,
}

/// The full upgrade history around a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomUpgradeHistory {
    /// Predecessor rooms, nearest to the current room first.
    pub previous: Vec<RoomUpgradeLink>,
    /// The starting room.
    pub current: RoomUpgradeLink,
    /// Successor rooms, nearest to the current room first.
    pub newer: Vec<RoomUpgradeLink>,
}

fn room_version(create: Option<&RawEvent>) -> String {
    create
        .and_then(|e| e.content.get("room_version"))
        .and_then(Value::as_str)
        .unwrap_or("1")
        .to_string()
}

fn predecessor_room_id(create: Option<&RawEvent>) -> Option<String> {
    create?
        .content
        .get("predecessor")?
        .get("room_id")?
        .as_str()
        .map(str::to_string)
}

fn replacement_room_id(tombstone: Option<&RawEvent>) -> Option<String> {
    tombstone?
        .content
        .get("replacement_room")?
        .as_str()
        .map(str::to_string)
}

/// Walk the upgrade chain in both directions from `room_id`.
pub async fn upgrade_history<R: StateReader + ?Sized>(
    reader: &R,
    room_id: &str,
) -> Result<RoomUpgradeHistory, StateReadError> {
    let create = reader
        .get_room_state_event(room_id, event_type::CREATE, "")
        .await?;
    let tombstone = reader
        .get_room_state_event(room_id, event_type::TOMBSTONE, "")
        .await?;

    let current = RoomUpgradeLink {
        room_id: room_id.to_string(),
        version: room_version(create.as_ref()),
        ref_event_id: None,
    };

    let previous = walk(
        reader,
        room_id,
        predecessor_room_id(create.as_ref()),
        Direction::Backward,
    )
    .await?;
    let newer = walk(
        reader,
        room_id,
        replacement_room_id(tombstone.as_ref()),
        Direction::Forward,
    )
    .await?;

    Ok(RoomUpgradeHistory {
        previous,
        current,
        newer,
    })
}

#[derive(Clone, Copy)]
enum Direction {
    Backward,
    Forward,
}

async fn walk<R: StateReader + ?Sized>(
    reader: &R,
    start_room: &str,
    first: Option<String>,
    direction: Direction,
) -> Result<Vec<RoomUpgradeLink>, StateReadError> {
    let mut chain = Vec::new();
    let mut visited: HashSet<String> = HashSet::from([start_room.to_string()]);
    let mut reached_from = start_room.to_string();
    let mut next = first;

    while let Some(candidate) = next.take() {
        let create = reader
            .get_room_state_event(&candidate, event_type::CREATE, "")
            .await?;
        let tombstone = reader
            .get_room_state_event(&candidate, event_type::TOMBSTONE, "")
            .await?;
        if create.is_none() && tombstone.is_none() {
            // No state events at all: unreadable room, dead end.
            break;
        }

        let version = room_version(create.as_ref());

        // The back-reference must agree with the path that reached this
        // room; otherwise the edge is untrusted and reported as absent.
        let ref_event_id = match direction {
            Direction::Backward => tombstone
                .as_ref()
                .filter(|t| replacement_room_id(Some(t)).as_deref() == Some(&reached_from))
                .and_then(|t| t.event_id.clone()),
            Direction::Forward => create
                .as_ref()
                .filter(|c| predecessor_room_id(Some(c)).as_deref() == Some(&reached_from))
                .and_then(|c| c.event_id.clone()),
        };

        if visited.contains(&candidate) {
            // Cycle: append the repeated room once as a terminator.
            chain.push(RoomUpgradeLink {
                room_id: candidate,
                version,
                ref_event_id: None,
            });
            break;
        }
        visited.insert(candidate.clone());

        next = match direction {
            Direction::Backward => predecessor_room_id(create.as_ref()),
            Direction::Forward => replacement_room_id(tombstone.as_ref()),
        };
        reached_from.clone_from(&candidate);
        chain.push(RoomUpgradeLink {
            room_id: candidate,
            version,
            ref_event_id,
        });
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_reader::MemoryStateReader;
    use serde_json::json;

    fn create_event(room: &str, version: &str, predecessor: Option<&str>) -> RawEvent {
        let mut content = json!({"room_version": version});
        if let Some(prev) = predecessor {
            content["predecessor"] = json!({"room_id": prev, "event_id": "$last"});
        }
        serde_json::from_value(json!({
            "sender": "@admin:x.org",
            "type": "m.room.create",
            "state_key": "",
            "event_id": format!("$create-{room}"),
            "room_id": room,
            "content": content
        }))
        .unwrap()
    }

    fn tombstone_event(room: &str, replacement: &str) -> RawEvent {
        serde_json::from_value(json!({
            "sender": "@admin:x.org",
            "type": "m.room.tombstone",
            "state_key": "",
            "event_id": format!("$tombstone-{room}"),
            "room_id": room,
            "content": {"body": "upgraded", "replacement_room": replacement}
        }))
        .unwrap()
    }

    fn add_room(
        reader: &MemoryStateReader,
        room: &str,
        version: &str,
        predecessor: Option<&str>,
        replacement: Option<&str>,
    ) {
        reader.insert(room, "m.room.create", "", create_event(room, version, predecessor));
        if let Some(next) = replacement {
            reader.insert(room, "m.room.tombstone", "", tombstone_event(room, next));
        }
    }

    /// prev3 <- prev2 <- prev1 <- current -> new1 -> new2 -> new3
    fn linear_chain() -> MemoryStateReader {
        let reader = MemoryStateReader::new();
        add_room(&reader, "!prev3:x.org", "1", None, Some("!prev2:x.org"));
        add_room(&reader, "!prev2:x.org", "4", Some("!prev3:x.org"), Some("!prev1:x.org"));
        add_room(&reader, "!prev1:x.org", "6", Some("!prev2:x.org"), Some("!current:x.org"));
        add_room(&reader, "!current:x.org", "9", Some("!prev1:x.org"), Some("!new1:x.org"));
        add_room(&reader, "!new1:x.org", "10", Some("!current:x.org"), Some("!new2:x.org"));
        add_room(&reader, "!new2:x.org", "11", Some("!new1:x.org"), Some("!new3:x.org"));
        add_room(&reader, "!new3:x.org", "11", Some("!new2:x.org"), None);
        reader
    }

    #[tokio::test]
    async fn walks_linear_chain_in_both_directions() {
        let reader = linear_chain();
        let history = upgrade_history(&reader, "!current:x.org").await.unwrap();

        assert_eq!(history.current.room_id, "!current:x.org");
        assert_eq!(history.current.version, "9");
        assert_eq!(history.current.ref_event_id, None);

        let previous: Vec<&str> =
            history.previous.iter().map(|l| l.room_id.as_str()).collect();
        assert_eq!(previous, vec!["!prev1:x.org", "!prev2:x.org", "!prev3:x.org"]);
        let newer: Vec<&str> = history.newer.iter().map(|l| l.room_id.as_str()).collect();
        assert_eq!(newer, vec!["!new1:x.org", "!new2:x.org", "!new3:x.org"]);

        // Every link in a fully consistent chain carries its reference.
        assert_eq!(
            history.previous[0].ref_event_id.as_deref(),
            Some("$tombstone-!prev1:x.org")
        );
        assert!(history.previous.iter().all(|l| l.ref_event_id.is_some()));
        assert_eq!(
            history.newer[0].ref_event_id.as_deref(),
            Some("$create-!new1:x.org")
        );
        assert!(history.newer.iter().all(|l| l.ref_event_id.is_some()));
    }

    #[tokio::test]
    async fn oldest_room_without_tombstone_has_no_ref() {
        let reader = MemoryStateReader::new();
        // prev has no tombstone; current still points back at it.
        add_room(&reader, "!prev:x.org", "1", None, None);
        add_room(&reader, "!current:x.org", "5", Some("!prev:x.org"), None);

        let history = upgrade_history(&reader, "!current:x.org").await.unwrap();
        assert_eq!(history.previous.len(), 1);
        assert_eq!(history.previous[0].room_id, "!prev:x.org");
        assert_eq!(history.previous[0].ref_event_id, None);
        assert!(history.newer.is_empty());
    }

    #[tokio::test]
    async fn mismatched_back_reference_is_untrusted() {
        let reader = MemoryStateReader::new();
        // prev's tombstone points at some other room, not current.
        add_room(&reader, "!prev:x.org", "1", None, Some("!elsewhere:x.org"));
        add_room(&reader, "!current:x.org", "5", Some("!prev:x.org"), None);

        let history = upgrade_history(&reader, "!current:x.org").await.unwrap();
        assert_eq!(history.previous.len(), 1);
        assert_eq!(history.previous[0].ref_event_id, None);
    }

    #[tokio::test]
    async fn forward_mismatched_predecessor_is_untrusted() {
        let reader = MemoryStateReader::new();
        add_room(&reader, "!current:x.org", "5", None, Some("!new:x.org"));
        // new's create claims a different predecessor.
        add_room(&reader, "!new:x.org", "6", Some("!other:x.org"), None);

        let history = upgrade_history(&reader, "!current:x.org").await.unwrap();
        assert_eq!(history.newer.len(), 1);
        assert_eq!(history.newer[0].room_id, "!new:x.org");
        assert_eq!(history.newer[0].ref_event_id, None);
    }

    #[tokio::test]
    async fn self_referencing_tombstone_terminates() {
        let reader = MemoryStateReader::new();
        // The room's tombstone claims the room replaced itself.
        add_room(&reader, "!loop:x.org", "5", None, Some("!loop:x.org"));

        let history = upgrade_history(&reader, "!loop:x.org").await.unwrap();
        assert_eq!(history.newer.len(), 1);
        assert_eq!(history.newer[0].room_id, "!loop:x.org");
        assert_eq!(history.newer[0].ref_event_id, None);
        assert!(history.previous.is_empty());
    }

    #[tokio::test]
    async fn predecessor_cycle_terminates_after_one_repeat() {
        let reader = MemoryStateReader::new();
        // a <- b <- a: walking back from a revisits a.
        add_room(&reader, "!a:x.org", "5", Some("!b:x.org"), Some("!b:x.org"));
        add_room(&reader, "!b:x.org", "5", Some("!a:x.org"), Some("!a:x.org"));

        let history = upgrade_history(&reader, "!a:x.org").await.unwrap();
        let previous: Vec<&str> =
            history.previous.iter().map(|l| l.room_id.as_str()).collect();
        assert_eq!(previous, vec!["!b:x.org", "!a:x.org"]);
        // The repeated starting room is the cycle terminator.
        assert_eq!(history.previous[1].ref_event_id, None);
    }

    #[tokio::test]
    async fn unreadable_predecessor_is_dead_end() {
        let reader = MemoryStateReader::new();
        add_room(&reader, "!current:x.org", "5", Some("!ghost:x.org"), None);
        // !ghost:x.org has no state events at all.

        let history = upgrade_history(&reader, "!current:x.org").await.unwrap();
        assert!(history.previous.is_empty());
    }

    #[tokio::test]
    async fn room_without_create_defaults_to_version_1() {
        let reader = MemoryStateReader::new();
        let history = upgrade_history(&reader, "!bare:x.org").await.unwrap();
        assert_eq!(history.current.version, "1");
        assert!(history.previous.is_empty());
        assert!(history.newer.is_empty());
    }
}
