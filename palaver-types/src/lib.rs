//! # palaver-types
//!
//! Wire format and identity types for the Palaver chat client engine.
//!
//! This crate provides the foundational types used across all Palaver crates:
//! - [`RoomId`], [`UserId`], [`EventId`], [`RoomAlias`] - validated identifiers
//! - [`RawEvent`], [`TypedEvent`] - raw event payloads and typed views
//! - [`SyncResponse`] - the long-poll sync wire shape
//! - [`PowerLevelsContent`] - room authorization state content
//! - [`ProtocolError`] - typed server rejection payloads

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod ids;
mod power_levels;
mod sync;

pub use error::ProtocolError;
pub use event::{event_type, EventError, MembershipEvent, MessageEvent, RawEvent, RoomEvent,
    StateEvent, TypedEvent, Unsigned};
pub use ids::{EventId, IdentifierError, RoomAlias, RoomId, UserId};
pub use power_levels::{NotificationLevels, PowerLevelAction, PowerLevelsContent};
pub use sync::{CachedFilter, DeviceLists, EventContainer, FilterDefinition, InvitedRoom,
    JoinedRoom, LeftRoom, Rooms, StateBlock, SyncResponse, Timeline};
