//! Novelty, by event identity rather than venue. A household that attended last
//! month's storytime still wants this month's.

use std::collections::BTreeSet;

use hearth_common::types::{CanonicalEvent, CheckKind, CheckOutcome};

pub fn novelty_check(event: &CanonicalEvent, attended: &BTreeSet<String>) -> CheckOutcome {
    if attended.contains(&event.fingerprint) {
        CheckOutcome::fail(CheckKind::Novelty, "already attended this event")
    } else {
        CheckOutcome::pass(CheckKind::Novelty, "not previously attended")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_event;

    #[test]
    fn attended_event_fails() {
        let event = make_event("Storytime");
        let attended = BTreeSet::from([event.fingerprint.clone()]);
        assert!(!novelty_check(&event, &attended).passed);
    }

    #[test]
    fn unseen_event_passes() {
        let event = make_event("Storytime");
        assert!(novelty_check(&event, &BTreeSet::new()).passed);
    }

    #[test]
    fn same_venue_different_event_passes() {
        let event = make_event("Storytime");
        let attended = BTreeSet::from(["some-other-fingerprint".to_string()]);
        assert!(novelty_check(&event, &attended).passed);
    }
}
