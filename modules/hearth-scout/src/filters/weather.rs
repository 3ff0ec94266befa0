//! Weather suitability for outdoor events. Advisory, not safety-critical:
//! a missing forecast passes.

use std::sync::LazyLock;

use regex::Regex;

use forecast_client::Forecast;
use hearth_common::types::{CanonicalEvent, CheckKind, CheckOutcome};

static OUTDOOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(outdoor|park|playground|trail|hike|beach|garden|farm|orchard|splash pad|nature|picnic|zoo)\b",
    )
    .unwrap()
});

/// Keyword classification over title and description.
pub fn is_outdoor(event: &CanonicalEvent) -> bool {
    OUTDOOR_RE.is_match(&event.title) || OUTDOOR_RE.is_match(&event.description)
}

/// `forecast` is None when the event is indoor or the fetch failed; both
/// pass.
pub fn weather_check(outdoor: bool, forecast: Option<&Forecast>) -> CheckOutcome {
    if !outdoor {
        return CheckOutcome::pass(CheckKind::Weather, "indoor event");
    }
    match forecast {
        Some(f) if f.is_outdoor_friendly => CheckOutcome::pass(
            CheckKind::Weather,
            format!("forecast {} {:.0}C", f.condition, f.temperature_c),
        ),
        Some(f) => CheckOutcome::fail(
            CheckKind::Weather,
            format!(
                "poor forecast: {} {:.0}C, {:.0}% precipitation",
                f.condition,
                f.temperature_c,
                f.precipitation_chance * 100.0
            ),
        ),
        None => CheckOutcome::pass(CheckKind::Weather, "forecast unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_event;

    fn forecast(friendly: bool) -> Forecast {
        Forecast {
            temperature_c: if friendly { 22.0 } else { 2.0 },
            condition: if friendly { "clear" } else { "rain" }.into(),
            precipitation_chance: if friendly { 0.1 } else { 0.9 },
            wind_kph: 10.0,
            is_outdoor_friendly: friendly,
        }
    }

    #[test]
    fn park_event_is_outdoor() {
        let mut event = make_event("Music in the Park");
        event.description = "Bring a blanket".into();
        assert!(is_outdoor(&event));
    }

    #[test]
    fn library_event_is_indoor() {
        let event = make_event("Storytime at Library");
        assert!(!is_outdoor(&event));
    }

    #[test]
    fn indoor_event_ignores_weather() {
        assert!(weather_check(false, Some(&forecast(false))).passed);
    }

    #[test]
    fn outdoor_event_fails_on_bad_forecast() {
        assert!(!weather_check(true, Some(&forecast(false))).passed);
    }

    #[test]
    fn outdoor_event_passes_on_good_forecast() {
        assert!(weather_check(true, Some(&forecast(true))).passed);
    }

    #[test]
    fn missing_forecast_fails_open() {
        assert!(weather_check(true, None).passed);
    }
}
