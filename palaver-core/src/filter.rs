//! Filter reuse decision.
//!
//! A sync filter id is only valid for the definition it was created with.
//! The cached id is reused iff the cached definition equals the desired one
//! by content; any difference (or no cache at all) forces re-creation.

use palaver_types::{CachedFilter, FilterDefinition};

/// The outcome of comparing a cached filter against the desired definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// The cached filter id matches the desired definition and can be reused.
    Reuse(String),
    /// A new filter must be registered with the server (and re-cached).
    Create,
}

/// Decide whether a cached filter can serve the desired definition.
pub fn filter_decision(
    cached: Option<&CachedFilter>,
    desired: &FilterDefinition,
) -> FilterDecision {
    match cached {
        Some(filter) if &filter.definition == desired => FilterDecision::Reuse(filter.id.clone()),
        _ => FilterDecision::Create,
    }
}
