//! Raw event payloads and typed views over them.
//!
//! A [`RawEvent`] is the decoded wire form of a room/account-data/to-device
//! event. It is immutable once received; the only sanctioned mutation is the
//! preprocessor pipeline's in-place rewrite of `content` before projection.
//!
//! [`TypedEvent`] classifies a raw event exactly once at ingestion into a
//! tagged union (message / membership / state / plain room event) instead of
//! re-checking type strings at every access. The variants borrow the raw
//! event; no content is copied.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Well-known event type strings.
pub mod event_type {
    /// A room text/media message.
    pub const MESSAGE: &str = "m.room.message";
    /// A room membership state event.
    pub const MEMBER: &str = "m.room.member";
    /// The room power levels state event.
    pub const POWER_LEVELS: &str = "m.room.power_levels";
    /// The room creation state event.
    pub const CREATE: &str = "m.room.create";
    /// The room tombstone (upgrade) state event.
    pub const TOMBSTONE: &str = "m.room.tombstone";
    /// An end-to-end encrypted room event.
    pub const ENCRYPTED: &str = "m.room.encrypted";
    /// The room encryption configuration state event.
    pub const ENCRYPTION: &str = "m.room.encryption";
    /// The room type value marking a space.
    pub const SPACE: &str = "m.space";
}

/// Errors from typed event accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// A required content field was stripped by redaction.
    #[error("event content was redacted")]
    Redacted,

    /// The event payload does not have the shape its type requires.
    #[error("malformed event: {0}")]
    Malformed(String),
}

/// The `unsigned` metadata block attached by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Unsigned {
    /// Milliseconds since the event occurred, as reported by the server.
    /// Kept as a raw value: servers have been observed sending strings here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<Value>,

    /// Any additional unsigned fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A raw event as received from the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    /// The user id of the event sender.
    pub sender: String,

    /// The event type string.
    #[serde(rename = "type")]
    pub event_type: String,

    /// The event content. May be empty after redaction.
    #[serde(default)]
    pub content: Map<String, Value>,

    /// The room this event belongs to. Absent in sync payloads where the
    /// room id is the enclosing map key, and in to-device events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,

    /// The event id. Absent in stripped invite state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// The state key, present iff this is a state event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,

    /// Server-attached unsigned metadata.
    #[serde(default)]
    pub unsigned: Unsigned,
}

impl RawEvent {
    /// Age of the event in milliseconds. A missing or non-numeric `age` is
    /// treated as 0, i.e. "most recent".
    pub fn age_ms(&self) -> i64 {
        self.unsigned.age.as_ref().and_then(Value::as_i64).unwrap_or(0)
    }

    /// Whether this event carries a state key.
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// The `content.membership` string, when present.
    pub fn membership(&self) -> Option<&str> {
        self.content.get("membership").and_then(Value::as_str)
    }
}

/// A typed view over a [`RawEvent`], constructed once at ingestion.
#[derive(Debug, Clone, Copy)]
pub enum TypedEvent<'a> {
    /// An `m.room.message` timeline event.
    Message(MessageEvent<'a>),
    /// An `m.room.member` state event.
    Membership(MembershipEvent<'a>),
    /// Any other state event.
    State(StateEvent<'a>),
    /// Any other room event.
    Room(RoomEvent<'a>),
}

impl<'a> TypedEvent<'a> {
    /// Classify a raw event by its type string and state key presence.
    pub fn classify(raw: &'a RawEvent) -> Self {
        match (raw.event_type.as_str(), raw.state_key.as_deref()) {
            (event_type::MEMBER, Some(_)) => Self::Membership(MembershipEvent { raw }),
            (_, Some(_)) => Self::State(StateEvent { raw }),
            (event_type::MESSAGE, None) => Self::Message(MessageEvent { raw }),
            _ => Self::Room(RoomEvent { raw }),
        }
    }

    /// The underlying raw event.
    pub fn raw(&self) -> &'a RawEvent {
        match self {
            Self::Message(e) => e.raw,
            Self::Membership(e) => e.raw,
            Self::State(e) => e.raw,
            Self::Room(e) => e.raw,
        }
    }
}

/// View over a plain room (timeline) event.
#[derive(Debug, Clone, Copy)]
pub struct RoomEvent<'a> {
    raw: &'a RawEvent,
}

impl<'a> RoomEvent<'a> {
    /// The event type string.
    pub fn kind(&self) -> &'a str {
        &self.raw.event_type
    }

    /// The event content.
    pub fn content(&self) -> &'a Map<String, Value> {
        &self.raw.content
    }
}

/// View over an `m.room.message` event.
#[derive(Debug, Clone, Copy)]
pub struct MessageEvent<'a> {
    raw: &'a RawEvent,
}

impl<'a> MessageEvent<'a> {
    /// The message body. Fails with [`EventError::Redacted`] when the body
    /// was stripped by redaction.
    pub fn body(&self) -> Result<&'a str, EventError> {
        self.raw
            .content
            .get("body")
            .and_then(Value::as_str)
            .ok_or(EventError::Redacted)
    }

    /// The `msgtype` discriminator, e.g. `m.text`.
    pub fn msgtype(&self) -> Result<&'a str, EventError> {
        self.raw
            .content
            .get("msgtype")
            .and_then(Value::as_str)
            .ok_or(EventError::Redacted)
    }

    /// The underlying raw event.
    pub fn raw(&self) -> &'a RawEvent {
        self.raw
    }
}

/// View over an `m.room.member` state event.
#[derive(Debug, Clone, Copy)]
pub struct MembershipEvent<'a> {
    raw: &'a RawEvent,
}

impl<'a> MembershipEvent<'a> {
    /// The user this membership applies to (the state key).
    pub fn subject(&self) -> Result<&'a str, EventError> {
        self.raw
            .state_key
            .as_deref()
            .ok_or_else(|| EventError::Malformed("membership event without state_key".into()))
    }

    /// The membership value: `join`, `leave`, `ban`, `invite` or `knock`.
    /// Fails with [`EventError::Redacted`] when stripped.
    pub fn membership(&self) -> Result<&'a str, EventError> {
        self.raw.membership().ok_or(EventError::Redacted)
    }

    /// The underlying raw event.
    pub fn raw(&self) -> &'a RawEvent {
        self.raw
    }
}

/// View over a non-membership state event.
#[derive(Debug, Clone, Copy)]
pub struct StateEvent<'a> {
    raw: &'a RawEvent,
}

impl<'a> StateEvent<'a> {
    /// The event type string.
    pub fn kind(&self) -> &'a str {
        &self.raw.event_type
    }

    /// The state key.
    pub fn state_key(&self) -> &'a str {
        self.raw.state_key.as_deref().unwrap_or("")
    }

    /// The event content.
    pub fn content(&self) -> &'a Map<String, Value> {
        &self.raw.content
    }

    /// The underlying raw event.
    pub fn raw(&self) -> &'a RawEvent {
        self.raw
    }
}
