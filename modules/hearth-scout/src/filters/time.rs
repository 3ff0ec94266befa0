//! Time-range plausibility and lead-time bounds.

use chrono::{DateTime, Datelike, Duration, Utc};

use hearth_common::types::{CanonicalEvent, CheckKind, CheckOutcome};

/// Grace period after start before an event counts as past; a run that
/// kicks off mid-event should not flap.
const PAST_GRACE_HOURS: i64 = 1;

/// Boundary buffer on both lead-time edges, same anti-flap purpose.
const LEAD_BUFFER_HOURS: i64 = 1;

/// Years beyond the current one that still count as plausible.
const MAX_PLAUSIBLE_YEARS_AHEAD: i32 = 2;

pub fn time_check(
    event: &CanonicalEvent,
    now: DateTime<Utc>,
    min_lead_hours: i64,
    max_lead_days: i64,
) -> CheckOutcome {
    let year = event.starts_at.year();
    if year < now.year() || year > now.year() + MAX_PLAUSIBLE_YEARS_AHEAD {
        return CheckOutcome::fail(
            CheckKind::Time,
            format!("implausible event year {year}"),
        );
    }

    if event.starts_at < now - Duration::hours(PAST_GRACE_HOURS) {
        return CheckOutcome::fail(CheckKind::Time, "event already past");
    }

    let min_edge = now + Duration::hours(min_lead_hours) - Duration::hours(LEAD_BUFFER_HOURS);
    if event.starts_at < min_edge {
        return CheckOutcome::fail(
            CheckKind::Time,
            format!("less than {min_lead_hours}h notice"),
        );
    }

    let max_edge = now + Duration::days(max_lead_days) + Duration::hours(LEAD_BUFFER_HOURS);
    if event.starts_at > max_edge {
        return CheckOutcome::fail(
            CheckKind::Time,
            format!("more than {max_lead_days} days out"),
        );
    }

    CheckOutcome::pass(CheckKind::Time, "within booking window")
}
