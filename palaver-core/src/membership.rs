//! Authoritative membership selection.
//!
//! One sync batch can carry several membership events for the same user
//! (state resolution churn). The authoritative one for a leave/ban/invite
//! transition is the most recent: the candidate with the smallest
//! `unsigned.age`. A missing or non-numeric age counts as 0, i.e. most
//! recent. Events of the wrong type or with a different `state_key` never
//! influence the selection.

use palaver_types::{event_type, RawEvent};

/// Select the authoritative membership event for `subject` among candidate
/// events, restricted to the wanted membership values.
///
/// Returns the matching event with the minimum `unsigned.age`; ties keep
/// the earliest candidate in input order.
pub fn select_authoritative_membership<'a>(
    candidates: &'a [RawEvent],
    subject: &str,
    wanted_memberships: &[&str],
) -> Option<&'a RawEvent> {
    let mut best: Option<&RawEvent> = None;
    for event in candidates {
        if event.event_type != event_type::MEMBER {
            continue;
        }
        if event.state_key.as_deref() != Some(subject) {
            continue;
        }
        let Some(membership) = event.membership() else {
            continue;
        };
        if !wanted_memberships.contains(&membership) {
            continue;
        }
        match best {
            Some(current) if event.age_ms() >= current.age_ms() => {}
            _ => best = Some(event),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn member_event(subject: &str, membership: &str, age: serde_json::Value) -> RawEvent {
        serde_json::from_value(json!({
            "sender": "@sender:x.org",
            "type": "m.room.member",
            "state_key": subject,
            "event_id": format!("${}-{}", membership, age),
            "content": {"membership": membership},
            "unsigned": {"age": age}
        }))
        .unwrap()
    }

    #[test]
    fn selects_smallest_age() {
        let events = vec![
            member_event("@me:x.org", "leave", json!(5000)),
            member_event("@me:x.org", "leave", json!(100)),
            member_event("@me:x.org", "leave", json!(2000)),
        ];
        let chosen = select_authoritative_membership(&events, "@me:x.org", &["leave"]).unwrap();
        assert_eq!(chosen.age_ms(), 100);
    }

    #[test]
    fn missing_age_counts_as_most_recent() {
        let mut without_age = member_event("@me:x.org", "leave", json!(0));
        without_age.unsigned.age = None;
        let events = vec![member_event("@me:x.org", "leave", json!(100)), without_age];
        let chosen = select_authoritative_membership(&events, "@me:x.org", &["leave"]).unwrap();
        assert_eq!(chosen.age_ms(), 0);
        assert!(chosen.unsigned.age.is_none());
    }

    #[test]
    fn non_numeric_age_counts_as_most_recent() {
        let events = vec![
            member_event("@me:x.org", "ban", json!(50)),
            member_event("@me:x.org", "ban", json!("oldest")),
        ];
        let chosen = select_authoritative_membership(&events, "@me:x.org", &["leave", "ban"])
            .unwrap();
        assert_eq!(chosen.unsigned.age, Some(json!("oldest")));
    }

    #[test]
    fn wrong_state_key_is_ignored() {
        let events = vec![
            member_event("@other:x.org", "leave", json!(1)),
            member_event("@me:x.org", "leave", json!(9000)),
        ];
        let chosen = select_authoritative_membership(&events, "@me:x.org", &["leave"]).unwrap();
        assert_eq!(chosen.state_key.as_deref(), Some("@me:x.org"));
    }

    #[test]
    fn wrong_type_is_ignored() {
        let mut not_member = member_event("@me:x.org", "leave", json!(1));
        not_member.event_type = "m.room.message".to_string();
        let events = vec![not_member, member_event("@me:x.org", "leave", json!(500))];
        let chosen = select_authoritative_membership(&events, "@me:x.org", &["leave"]).unwrap();
        assert_eq!(chosen.age_ms(), 500);
    }

    #[test]
    fn unwanted_membership_is_ignored() {
        let events = vec![
            member_event("@me:x.org", "join", json!(1)),
            member_event("@me:x.org", "leave", json!(500)),
        ];
        let chosen = select_authoritative_membership(&events, "@me:x.org", &["leave", "ban"])
            .unwrap();
        assert_eq!(chosen.membership(), Some("leave"));
    }

    #[test]
    fn no_candidates_returns_none() {
        let events = vec![member_event("@other:x.org", "leave", json!(1))];
        assert!(select_authoritative_membership(&events, "@me:x.org", &["leave"]).is_none());
    }

    #[test]
    fn tie_keeps_first_candidate() {
        let first = member_event("@me:x.org", "leave", json!(100));
        let second = member_event("@me:x.org", "ban", json!(100));
        let events = vec![first.clone(), second];
        let chosen = select_authoritative_membership(&events, "@me:x.org", &["leave", "ban"])
            .unwrap();
        assert_eq!(chosen, &first);
    }
}
