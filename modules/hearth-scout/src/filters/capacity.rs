//! Capacity. Rejects only when capacity is known and explicitly zero;
//! unknown capacity is not a reason to hide an event.

use hearth_common::types::{CanonicalEvent, CheckKind, CheckOutcome};

pub fn capacity_check(event: &CanonicalEvent) -> CheckOutcome {
    match event.capacity {
        Some(cap) if cap.known_full() => CheckOutcome::fail(CheckKind::Capacity, "event is full"),
        Some(cap) => match cap.available {
            Some(n) => CheckOutcome::pass(CheckKind::Capacity, format!("{n} spots available")),
            None => CheckOutcome::pass(CheckKind::Capacity, "capacity unknown"),
        },
        None => CheckOutcome::pass(CheckKind::Capacity, "capacity unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_event;
    use hearth_common::types::Capacity;

    #[test]
    fn unknown_capacity_passes() {
        let event = make_event("Storytime");
        assert!(capacity_check(&event).passed);
    }

    #[test]
    fn known_zero_fails() {
        let mut event = make_event("Storytime");
        event.capacity = Some(Capacity {
            available: Some(0),
            total: Some(20),
        });
        assert!(!capacity_check(&event).passed);
    }

    #[test]
    fn open_spots_pass() {
        let mut event = make_event("Storytime");
        event.capacity = Some(Capacity {
            available: Some(4),
            total: Some(20),
        });
        assert!(capacity_check(&event).passed);
    }
}
