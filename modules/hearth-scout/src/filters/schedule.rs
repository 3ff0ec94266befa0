//! Schedule compatibility against the household's weekday/weekend floors
//! and quiet window.

use chrono::{Datelike, NaiveTime, Weekday};

use hearth_common::config::HouseholdSnapshot;
use hearth_common::types::{CanonicalEvent, CheckKind, CheckOutcome};

/// Synthetic start times assigned to all-day listings before the floors are
/// checked: after work on weekdays, mid-morning on weekends.
const DEFAULT_WEEKDAY_TIME: (u32, u32) = (17, 30);
const DEFAULT_WEEKEND_TIME: (u32, u32) = (9, 0);

#[derive(Debug)]
pub struct ScheduleVerdict {
    pub outcome: CheckOutcome,
    /// Quiet-window overlap. Demotes in scoring, never excludes here.
    pub nap_flag: bool,
}

/// The time of day the check runs against: the event's own time, a
/// classifier-extracted time for all-day listings, or the synthetic default.
pub fn effective_start_time(
    event: &CanonicalEvent,
    extracted_time: Option<NaiveTime>,
    weekend: bool,
) -> NaiveTime {
    if !event.all_day {
        return event.starts_at.time();
    }
    if let Some(time) = extracted_time {
        return time;
    }
    let (h, m) = if weekend {
        DEFAULT_WEEKEND_TIME
    } else {
        DEFAULT_WEEKDAY_TIME
    };
    NaiveTime::from_hms_opt(h, m, 0).expect("static time is valid")
}

pub fn schedule_check(
    event: &CanonicalEvent,
    household: &HouseholdSnapshot,
    extracted_time: Option<NaiveTime>,
) -> ScheduleVerdict {
    let weekend = matches!(event.starts_at.weekday(), Weekday::Sat | Weekday::Sun);
    let start = effective_start_time(event, extracted_time, weekend);

    if weekend {
        if start < household.weekend_earliest {
            return ScheduleVerdict {
                outcome: CheckOutcome::fail(
                    CheckKind::Schedule,
                    format!("starts before weekend floor {}", household.weekend_earliest),
                ),
                nap_flag: false,
            };
        }
        let nap_flag = start >= household.nap_start && start < household.nap_end;
        let reason = if nap_flag {
            "weekend start ok, overlaps quiet window"
        } else {
            "weekend start ok"
        };
        return ScheduleVerdict {
            outcome: CheckOutcome::pass(CheckKind::Schedule, reason),
            nap_flag,
        };
    }

    if start < household.weekday_earliest {
        return ScheduleVerdict {
            outcome: CheckOutcome::fail(
                CheckKind::Schedule,
                format!("starts before weekday floor {}", household.weekday_earliest),
            ),
            nap_flag: false,
        };
    }

    ScheduleVerdict {
        outcome: CheckOutcome::pass(CheckKind::Schedule, "weekday start ok"),
        nap_flag: false,
    }
}
