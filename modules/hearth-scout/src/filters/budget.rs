//! Budget ceiling. Free events always pass.

use hearth_common::types::{CanonicalEvent, CheckKind, CheckOutcome};

pub fn budget_check(event: &CanonicalEvent, ceiling_cents: u32) -> CheckOutcome {
    if event.cost_cents == 0 {
        return CheckOutcome::pass(CheckKind::Budget, "free event");
    }
    if event.cost_cents <= ceiling_cents {
        return CheckOutcome::pass(
            CheckKind::Budget,
            format!("${:.2} within budget", event.cost_cents as f64 / 100.0),
        );
    }
    CheckOutcome::fail(
        CheckKind::Budget,
        format!(
            "too expensive: ${:.2} exceeds ${:.2} ceiling",
            event.cost_cents as f64 / 100.0,
            ceiling_cents as f64 / 100.0
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_event;

    #[test]
    fn free_event_passes_zero_ceiling() {
        let event = make_event("Storytime");
        assert!(budget_check(&event, 0).passed);
    }

    #[test]
    fn paid_event_over_ceiling_fails() {
        let mut event = make_event("Zoo class");
        event.cost_cents = 1500;
        let outcome = budget_check(&event, 0);
        assert!(!outcome.passed);
        assert!(outcome.reason.contains("too expensive"));
    }

    #[test]
    fn paid_event_within_ceiling_passes() {
        let mut event = make_event("Zoo class");
        event.cost_cents = 1500;
        assert!(budget_check(&event, 2000).passed);
    }
}
