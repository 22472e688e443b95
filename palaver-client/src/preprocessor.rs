//! Per-event-type preprocessor pipeline.
//!
//! Every timeline/state/account-data event passes through the registry
//! before it is classified or emitted. A preprocessor claims a set of event
//! types and may rewrite the event's content in place; it borrows the event
//! only for the duration of the call. Each type has a single owner: a later
//! registration for an already-claimed type replaces the earlier one.

use palaver_types::RawEvent;
use std::collections::HashMap;
use std::sync::Arc;

/// The class of event being preprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A room timeline or state event.
    RoomEvent,
    /// A global or per-room account data event.
    AccountData,
    /// An ephemeral event (receipts, typing).
    EphemeralEvent,
}

/// A transformation hook for specific event types.
pub trait Preprocessor: Send + Sync {
    /// The event types this preprocessor claims.
    fn supported_event_types(&self) -> Vec<String>;

    /// Transform the event in place before projection.
    fn process_event(&self, event: &mut RawEvent, kind: EventKind);
}

/// Registry mapping event types to their single preprocessor.
#[derive(Default)]
pub struct PreprocessorRegistry {
    by_type: HashMap<String, Arc<dyn Preprocessor>>,
}

impl PreprocessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a preprocessor for every type it supports, replacing any
    /// earlier owner of those types.
    pub fn add(&mut self, preprocessor: Arc<dyn Preprocessor>) {
        for event_type in preprocessor.supported_event_types() {
            self.by_type.insert(event_type, Arc::clone(&preprocessor));
        }
    }

    /// Run the registered preprocessor for the event's type, if any.
    /// Events with no matching preprocessor pass through unchanged.
    pub fn run(&self, event: &mut RawEvent, kind: EventKind) {
        if let Some(preprocessor) = self.by_type.get(&event.event_type) {
            preprocessor.process_event(event, kind);
        }
    }

    /// Number of claimed event types.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Whether no preprocessor is registered.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl std::fmt::Debug for PreprocessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreprocessorRegistry")
            .field("types", &self.by_type.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct TagPreprocessor {
        types: Vec<String>,
        tag: &'static str,
    }

    impl Preprocessor for TagPreprocessor {
        fn supported_event_types(&self) -> Vec<String> {
            self.types.clone()
        }

        fn process_event(&self, event: &mut RawEvent, _kind: EventKind) {
            event.content.insert("tag".into(), json!(self.tag));
        }
    }

    fn event(event_type: &str) -> RawEvent {
        serde_json::from_value(json!({
            "sender": "@a:x.org",
            "type": event_type,
            "content": {}
        }))
        .unwrap()
    }

    #[test]
    fn runs_matching_preprocessor() {
        let mut registry = PreprocessorRegistry::new();
        registry.add(Arc::new(TagPreprocessor {
            types: vec!["m.custom".into()],
            tag: "seen",
        }));

        let mut ev = event("m.custom");
        registry.run(&mut ev, EventKind::RoomEvent);
        assert_eq!(ev.content.get("tag"), Some(&json!("seen")));
    }

    #[test]
    fn unmatched_events_pass_through() {
        let mut registry = PreprocessorRegistry::new();
        registry.add(Arc::new(TagPreprocessor {
            types: vec!["m.custom".into()],
            tag: "seen",
        }));

        let mut ev = event("m.other");
        registry.run(&mut ev, EventKind::RoomEvent);
        assert!(ev.content.is_empty());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry = PreprocessorRegistry::new();
        registry.add(Arc::new(TagPreprocessor {
            types: vec!["m.custom".into()],
            tag: "first",
        }));
        registry.add(Arc::new(TagPreprocessor {
            types: vec!["m.custom".into()],
            tag: "second",
        }));
        assert_eq!(registry.len(), 1);

        let mut ev = event("m.custom");
        registry.run(&mut ev, EventKind::RoomEvent);
        assert_eq!(ev.content.get("tag"), Some(&json!("second")));
    }

    #[test]
    fn one_preprocessor_can_claim_many_types() {
        let mut registry = PreprocessorRegistry::new();
        registry.add(Arc::new(TagPreprocessor {
            types: vec!["m.a".into(), "m.b".into()],
            tag: "multi",
        }));
        assert_eq!(registry.len(), 2);

        let mut a = event("m.a");
        let mut b = event("m.b");
        registry.run(&mut a, EventKind::AccountData);
        registry.run(&mut b, EventKind::RoomEvent);
        assert_eq!(a.content.get("tag"), Some(&json!("multi")));
        assert_eq!(b.content.get("tag"), Some(&json!("multi")));
    }
}
