//! Calendar conflicts. A hard conflict on the primary calendar excludes;
//! a conflict on the second household calendar only warns.

use hearth_common::types::{CheckKind, CheckOutcome};

use crate::traits::CalendarVerdict;

#[derive(Debug)]
pub struct CalendarCheck {
    pub outcome: CheckOutcome,
    pub warning: bool,
}

/// `verdict` is None when the lookup failed: neutral, passes without a
/// warning.
pub fn calendar_check(verdict: Option<CalendarVerdict>) -> CalendarCheck {
    match verdict {
        Some(v) if v.has_conflict => CalendarCheck {
            outcome: CheckOutcome::fail(CheckKind::Calendar, "conflicts with household calendar"),
            warning: false,
        },
        Some(v) => CalendarCheck {
            outcome: CheckOutcome::pass(
                CheckKind::Calendar,
                if v.has_warning {
                    "soft conflict on second calendar"
                } else {
                    "no calendar conflict"
                },
            ),
            warning: v.has_warning,
        },
        None => CalendarCheck {
            outcome: CheckOutcome::pass(CheckKind::Calendar, "calendar unavailable"),
            warning: false,
        },
    }
}
