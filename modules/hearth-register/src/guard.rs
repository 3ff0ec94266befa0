//! The payment safety guard.
//!
//! Two independent layers: a pre-flight check on the declared cost that runs
//! before any automation call, and a rendered-page scan that runs before any
//! form submission. Either one aborting is a safety violation, a distinct,
//! non-retryable error class. Accumulated violations trip a process-wide
//! emergency stop that halts all automated registration (fail closed).

use std::sync::atomic::{AtomicU32, Ordering};

use uuid::Uuid;

use hearth_common::safety::detect_payment_signals;
use hearth_common::types::{CanonicalEvent, PaymentViolation, ViolationKind};
use hearth_common::HearthError;

/// Violations per process lifetime before automation halts entirely.
pub const EMERGENCY_STOP_THRESHOLD: u32 = 3;

/// Shared violation counter. Once tripped it stays tripped; only a process
/// restart (and a human) resets it.
#[derive(Debug)]
pub struct EmergencyStop {
    violations: AtomicU32,
    threshold: u32,
}

impl Default for EmergencyStop {
    fn default() -> Self {
        Self {
            violations: AtomicU32::new(0),
            threshold: EMERGENCY_STOP_THRESHOLD,
        }
    }
}

impl EmergencyStop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            violations: AtomicU32::new(0),
            threshold,
        }
    }

    /// Count one violation. Returns the running total.
    pub fn record_violation(&self) -> u32 {
        self.violations.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_tripped(&self) -> bool {
        self.violations.load(Ordering::SeqCst) >= self.threshold
    }

    pub fn violation_count(&self) -> u32 {
        self.violations.load(Ordering::SeqCst)
    }
}

/// Pre-flight guard: automation never starts for an event with a nonzero
/// declared cost. Runs before any network call.
pub fn preflight_check(event: &CanonicalEvent) -> Result<(), HearthError> {
    if event.cost_cents > 0 {
        return Err(HearthError::SafetyViolation(format!(
            "refusing to automate registration for paid event ({} cents declared)",
            event.cost_cents
        )));
    }
    Ok(())
}

/// Build the pre-flight violation record for a paid event.
pub fn paid_event_violation(event: &CanonicalEvent) -> PaymentViolation {
    PaymentViolation::new(
        ViolationKind::PaidEventAutomation,
        event.id,
        format!("declared cost {} cents", event.cost_cents),
    )
}

/// Runtime page guard: scan rendered content for payment signals. The
/// declared cost is irrelevant here; source data can be wrong and pages
/// can upsell.
pub fn scan_rendered_page(event_id: Uuid, content: &str) -> Vec<PaymentViolation> {
    detect_payment_signals(content)
        .into_iter()
        .map(|signal| PaymentViolation::new(signal.kind, event_id, signal.matched))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hearth_common::types::{EventStatus, Location};

    fn event(cost_cents: u32) -> CanonicalEvent {
        CanonicalEvent {
            id: Uuid::new_v4(),
            fingerprint: "fp".into(),
            title: "Storytime".into(),
            starts_at: Utc::now(),
            all_day: false,
            location: Location::default(),
            age_range: None,
            cost_cents,
            registration_url: String::new(),
            alternate_urls: vec![],
            registration_opens_at: None,
            capacity: None,
            description: String::new(),
            status: EventStatus::Approved,
            sources: Default::default(),
            merge_count: 1,
            first_seen: Utc::now(),
            last_merged_at: None,
            filter: None,
            score: None,
        }
    }

    #[test]
    fn free_event_passes_preflight() {
        assert!(preflight_check(&event(0)).is_ok());
    }

    #[test]
    fn paid_event_fails_preflight_as_safety_violation() {
        let err = preflight_check(&event(1500)).unwrap_err();
        assert!(err.is_safety());
    }

    #[test]
    fn page_scan_flags_visible_price() {
        let violations = scan_rendered_page(Uuid::new_v4(), "Registration fee: $10");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::VisiblePrice);
    }

    #[test]
    fn emergency_stop_trips_at_threshold() {
        let stop = EmergencyStop::with_threshold(2);
        assert!(!stop.is_tripped());
        stop.record_violation();
        assert!(!stop.is_tripped());
        stop.record_violation();
        assert!(stop.is_tripped());
    }
}
