//! Age appropriateness.
//!
//! Classifier-first: when a suitability verdict is available it wins, since
//! the classifier reads free text the declared range misses. Without one
//! (collaborator absent or failing) the declared age range is checked
//! against the children's current ages.

use hearth_common::types::{CanonicalEvent, CheckKind, CheckOutcome};

use crate::traits::Suitability;

pub fn age_check(
    event: &CanonicalEvent,
    suitability: Option<&Suitability>,
    child_ages: &[u8],
) -> CheckOutcome {
    if let Some(verdict) = suitability {
        return if verdict.suitable {
            CheckOutcome::pass(CheckKind::Age, verdict.reason.clone())
        } else {
            CheckOutcome::fail(CheckKind::Age, verdict.reason.clone())
        };
    }

    let Some(range) = event.age_range else {
        return CheckOutcome::pass(CheckKind::Age, "no declared age range");
    };

    if child_ages.iter().any(|age| range.contains(*age)) {
        CheckOutcome::pass(
            CheckKind::Age,
            format!("ages {}-{} fits a child", range.min_years, range.max_years),
        )
    } else {
        CheckOutcome::fail(
            CheckKind::Age,
            format!(
                "ages {}-{} does not fit any child",
                range.min_years, range.max_years
            ),
        )
    }
}
