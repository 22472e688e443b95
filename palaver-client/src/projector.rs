//! Room-state projection of sync payloads onto the event bus.
//!
//! The projector consumes one decoded sync payload per cycle and turns it
//! into typed signals: joins, leaves, invites, messages, archival,
//! upgrades, generic room events and account data. It owns the only piece
//! of cross-cycle state in the sync path, the set of rooms already seen as
//! joined, and mutates it exclusively from within its own processing call.

use crate::bus::{AccountDataSignal, EventBus, RoomEventSignal, RoomInvite, RoomJoin, RoomLeave};
use crate::crypto::EncryptionOrchestrator;
use crate::preprocessor::{EventKind, PreprocessorRegistry};
use palaver_core::select_authoritative_membership;
use palaver_types::{event_type, RawEvent, SyncResponse, TypedEvent};
use std::collections::HashSet;

/// Projects sync payloads into bus signals.
///
/// Join signals are edge-triggered: a room emits "join" only the first time
/// it appears in the join section this process lifetime, and again only
/// after an authoritative leave was observed in between. Everything else is
/// re-emitted as delivered.
#[derive(Debug)]
pub struct RoomStateProjector {
    own_user_id: String,
    known_joined: HashSet<String>,
}

impl RoomStateProjector {
    /// Create a projector for the given own user id.
    pub fn new(own_user_id: impl Into<String>) -> Self {
        Self {
            own_user_id: own_user_id.into(),
            known_joined: HashSet::new(),
        }
    }

    /// Project one sync payload onto the bus.
    pub async fn process(
        &mut self,
        response: &SyncResponse,
        registry: &PreprocessorRegistry,
        crypto: &EncryptionOrchestrator,
        bus: &EventBus,
    ) {
        for event in &response.account_data.events {
            self.emit_account_data(None, event, registry, bus);
        }

        for (room_id, joined) in &response.rooms.join {
            if !self.known_joined.contains(room_id) {
                self.known_joined.insert(room_id.clone());
                // Synthetic marker (None) when the join membership event did
                // not make it into this batch's timeline.
                let membership_event = select_authoritative_membership(
                    &joined.timeline.events,
                    &self.own_user_id,
                    &["join"],
                )
                .cloned();
                tracing::debug!(room_id, "room joined");
                bus.publish_join(RoomJoin {
                    room_id: room_id.clone(),
                    membership_event,
                });
            }

            for event in &joined.state.events {
                self.project_room_event(room_id, event, registry, crypto, bus)
                    .await;
            }
            for event in &joined.timeline.events {
                self.project_room_event(room_id, event, registry, crypto, bus)
                    .await;
            }
            for event in &joined.account_data.events {
                self.emit_account_data(Some(room_id), event, registry, bus);
            }
        }

        for (room_id, left) in &response.rooms.leave {
            if let Some(event) = select_authoritative_membership(
                &left.timeline.events,
                &self.own_user_id,
                &["leave", "ban"],
            ) {
                // Forget the join edge so a later rejoin fires again.
                self.known_joined.remove(room_id);
                tracing::debug!(room_id, membership = ?event.membership(), "room left");
                bus.publish_leave(RoomLeave {
                    room_id: room_id.clone(),
                    event: event.clone(),
                });
            }
            for event in &left.account_data.events {
                self.emit_account_data(Some(room_id), event, registry, bus);
            }
        }

        for (room_id, invited) in &response.rooms.invite {
            if let Some(event) = select_authoritative_membership(
                &invited.invite_state.events,
                &self.own_user_id,
                &["invite"],
            ) {
                tracing::debug!(room_id, "room invite");
                bus.publish_invite(RoomInvite {
                    room_id: room_id.clone(),
                    event: event.clone(),
                });
            }
        }
    }

    async fn project_room_event(
        &self,
        room_id: &str,
        event: &RawEvent,
        registry: &PreprocessorRegistry,
        crypto: &EncryptionOrchestrator,
        bus: &EventBus,
    ) {
        let mut event = event.clone();
        registry.run(&mut event, EventKind::RoomEvent);
        // Classification sees the decrypted form; the encrypted original
        // stays available through the raw-event accessors. Decryption
        // changes the event type, so the pipeline runs again for the
        // decrypted type's owner.
        if let Some(mut decrypted) = crypto.maybe_decrypt(&event, room_id).await {
            registry.run(&mut decrypted, EventKind::RoomEvent);
            event = decrypted;
        }

        match TypedEvent::classify(&event) {
            TypedEvent::Message(_) => {
                bus.publish_message(RoomEventSignal {
                    room_id: room_id.to_string(),
                    event: event.clone(),
                });
            }
            TypedEvent::State(state) => {
                if state.kind() == event_type::TOMBSTONE && state.state_key().is_empty() {
                    bus.publish_archived(RoomEventSignal {
                        room_id: room_id.to_string(),
                        event: event.clone(),
                    });
                } else if state.kind() == event_type::CREATE
                    && state.content().contains_key("predecessor")
                {
                    bus.publish_upgraded(RoomEventSignal {
                        room_id: room_id.to_string(),
                        event: event.clone(),
                    });
                }
            }
            TypedEvent::Membership(_) | TypedEvent::Room(_) => {}
        }

        bus.publish_room_event(RoomEventSignal {
            room_id: room_id.to_string(),
            event,
        });
    }

    fn emit_account_data(
        &self,
        room_id: Option<&str>,
        event: &RawEvent,
        registry: &PreprocessorRegistry,
        bus: &EventBus,
    ) {
        let mut event = event.clone();
        registry.run(&mut event, EventKind::AccountData);
        bus.publish_account_data(AccountDataSignal {
            room_id: room_id.map(str::to_string),
            event,
        });
    }
}
