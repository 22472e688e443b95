//! Room state read capability.
//!
//! The authorizer and the upgrade walker do not own room state; they read
//! it through this seam. The client implements it over the transport, and
//! tests use the map-backed [`MemoryStateReader`].

use async_trait::async_trait;
use palaver_types::RawEvent;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from the state read capability.
#[derive(Debug, Clone, Error)]
pub enum StateReadError {
    /// The read failed for a reason other than "not present".
    #[error("state read failed: {0}")]
    Read(String),
}

/// Read access to a room's current state events.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Fetch a state event by room, type and state key.
    ///
    /// `Ok(None)` means the event does not exist or the room is not
    /// readable; errors are reserved for infrastructure failures.
    async fn get_room_state_event(
        &self,
        room_id: &str,
        kind: &str,
        state_key: &str,
    ) -> Result<Option<RawEvent>, StateReadError>;
}

/// Map-backed state reader for tests.
#[derive(Debug, Default)]
pub struct MemoryStateReader {
    events: Mutex<HashMap<(String, String, String), RawEvent>>,
}

impl MemoryStateReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a state event for a room.
    pub fn insert(&self, room_id: &str, kind: &str, state_key: &str, event: RawEvent) {
        self.events.lock().unwrap().insert(
            (room_id.to_string(), kind.to_string(), state_key.to_string()),
            event,
        );
    }
}

#[async_trait]
impl StateReader for MemoryStateReader {
    async fn get_room_state_event(
        &self,
        room_id: &str,
        kind: &str,
        state_key: &str,
    ) -> Result<Option<RawEvent>, StateReadError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(&(room_id.to_string(), kind.to_string(), state_key.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn returns_inserted_events() {
        let reader = MemoryStateReader::new();
        let event: RawEvent = serde_json::from_value(json!({
            "sender": "@a:x.org",
            "type": "m.room.create",
            "state_key": "",
            "event_id": "$create",
            "content": {"room_version": "10"}
        }))
        .unwrap();
        reader.insert("!a:x.org", "m.room.create", "", event.clone());

        let found = reader
            .get_room_state_event("!a:x.org", "m.room.create", "")
            .await
            .unwrap();
        assert_eq!(found, Some(event));
    }

    #[tokio::test]
    async fn missing_event_is_none() {
        let reader = MemoryStateReader::new();
        let found = reader
            .get_room_state_event("!a:x.org", "m.room.create", "")
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
