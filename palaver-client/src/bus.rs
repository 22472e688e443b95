//! Typed event bus for sync signals.
//!
//! One broadcast channel per signal kind, supporting multiple independent
//! subscribers. Delivery is synchronous within a sync cycle, so subscribers
//! observe signals in the order the projector produced them. Publishing to
//! a channel with no subscribers drops the signal silently.

use palaver_types::RawEvent;
use tokio::sync::broadcast;

/// Default per-channel capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// A room was joined for the first time this process lifetime.
#[derive(Debug, Clone)]
pub struct RoomJoin {
    /// The joined room.
    pub room_id: String,
    /// The membership event, when one was present in the timeline; `None`
    /// for a synthetic join marker.
    pub membership_event: Option<RawEvent>,
}

/// The own user left or was banned from a room.
#[derive(Debug, Clone)]
pub struct RoomLeave {
    /// The left room.
    pub room_id: String,
    /// The authoritative leave/ban membership event.
    pub event: RawEvent,
}

/// The own user was invited to a room.
#[derive(Debug, Clone)]
pub struct RoomInvite {
    /// The inviting room.
    pub room_id: String,
    /// The authoritative invite membership event.
    pub event: RawEvent,
}

/// A room event paired with its room.
#[derive(Debug, Clone)]
pub struct RoomEventSignal {
    /// The room the event belongs to.
    pub room_id: String,
    /// The (preprocessed, possibly decrypted) event.
    pub event: RawEvent,
}

/// An account data event, global or per-room.
#[derive(Debug, Clone)]
pub struct AccountDataSignal {
    /// The room scope, or `None` for global account data.
    pub room_id: Option<String>,
    /// The account data event.
    pub event: RawEvent,
}

/// The typed signal channels produced by one projector.
#[derive(Debug)]
pub struct EventBus {
    joins: broadcast::Sender<RoomJoin>,
    leaves: broadcast::Sender<RoomLeave>,
    invites: broadcast::Sender<RoomInvite>,
    messages: broadcast::Sender<RoomEventSignal>,
    room_events: broadcast::Sender<RoomEventSignal>,
    archived: broadcast::Sender<RoomEventSignal>,
    upgraded: broadcast::Sender<RoomEventSignal>,
    account_data: broadcast::Sender<AccountDataSignal>,
}

impl EventBus {
    /// Create a bus with the given per-channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            joins: broadcast::channel(capacity).0,
            leaves: broadcast::channel(capacity).0,
            invites: broadcast::channel(capacity).0,
            messages: broadcast::channel(capacity).0,
            room_events: broadcast::channel(capacity).0,
            archived: broadcast::channel(capacity).0,
            upgraded: broadcast::channel(capacity).0,
            account_data: broadcast::channel(capacity).0,
        }
    }

    /// Subscribe to first-time room joins.
    pub fn subscribe_joins(&self) -> broadcast::Receiver<RoomJoin> {
        self.joins.subscribe()
    }

    /// Subscribe to room leaves and bans.
    pub fn subscribe_leaves(&self) -> broadcast::Receiver<RoomLeave> {
        self.leaves.subscribe()
    }

    /// Subscribe to room invites.
    pub fn subscribe_invites(&self) -> broadcast::Receiver<RoomInvite> {
        self.invites.subscribe()
    }

    /// Subscribe to room messages.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<RoomEventSignal> {
        self.messages.subscribe()
    }

    /// Subscribe to all room events (every timeline/state event).
    pub fn subscribe_room_events(&self) -> broadcast::Receiver<RoomEventSignal> {
        self.room_events.subscribe()
    }

    /// Subscribe to room archival (tombstone) signals.
    pub fn subscribe_archived(&self) -> broadcast::Receiver<RoomEventSignal> {
        self.archived.subscribe()
    }

    /// Subscribe to room upgrade (create-with-predecessor) signals.
    pub fn subscribe_upgraded(&self) -> broadcast::Receiver<RoomEventSignal> {
        self.upgraded.subscribe()
    }

    /// Subscribe to account data, global and per-room.
    pub fn subscribe_account_data(&self) -> broadcast::Receiver<AccountDataSignal> {
        self.account_data.subscribe()
    }

    pub(crate) fn publish_join(&self, signal: RoomJoin) {
        let _ = self.joins.send(signal);
    }

    pub(crate) fn publish_leave(&self, signal: RoomLeave) {
        let _ = self.leaves.send(signal);
    }

    pub(crate) fn publish_invite(&self, signal: RoomInvite) {
        let _ = self.invites.send(signal);
    }

    pub(crate) fn publish_message(&self, signal: RoomEventSignal) {
        let _ = self.messages.send(signal);
    }

    pub(crate) fn publish_room_event(&self, signal: RoomEventSignal) {
        let _ = self.room_events.send(signal);
    }

    pub(crate) fn publish_archived(&self, signal: RoomEventSignal) {
        let _ = self.archived.send(signal);
    }

    pub(crate) fn publish_upgraded(&self, signal: RoomEventSignal) {
        let _ = self.upgraded.send(signal);
    }

    pub(crate) fn publish_account_data(&self, signal: AccountDataSignal) {
        let _ = self.account_data.send(signal);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
