//! # palaver-core
//!
//! Pure logic for the Palaver chat client engine (no I/O, instant tests).
//!
//! This crate implements the security-sensitive arithmetic and state
//! machines of the engine without any network or disk I/O:
//! - power level authorization arithmetic ([`levels`])
//! - authoritative membership selection ([`membership`])
//! - the sync loop lifecycle state machine and backoff policy ([`state`])
//! - the filter reuse/recreate decision ([`filter`])
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce
//! output without side effects. The actual I/O is performed by
//! `palaver-client`, which interprets the decisions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filter;
pub mod levels;
pub mod membership;
pub mod state;

pub use filter::{filter_decision, FilterDecision};
pub use levels::{
    coerce_level, effective_user_level, power_level_change_bounds, required_action_level,
    required_event_level, user_can_perform, user_can_send, PowerLevelBounds,
};
pub use membership::select_authoritative_membership;
pub use state::{backoff_delay, LifecycleAction, LifecycleEvent, SyncLifecycle};
