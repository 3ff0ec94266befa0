//! Payment-invariant tests: automation never touches a paid event's form,
//! never submits past a payment signal, and never records a completed
//! payment. Driven against a scripted driver and the in-memory store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use hearth_common::store::{EventStore, MemoryStore, RegistrationStore};
use hearth_common::types::{CanonicalEvent, EventStatus, Location};
use hearth_common::HearthError;
use hearth_register::{EmergencyStop, Registrar, RegistrantProfile, RegistrationDriver};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Scripted driver: serves a fixed page, counts calls, optionally fails.
struct ScriptedDriver {
    page: String,
    confirmation: String,
    fail_navigate: bool,
    navigated: AtomicBool,
    submitted: AtomicU32,
}

impl ScriptedDriver {
    fn serving(page: &str) -> Self {
        Self {
            page: page.to_string(),
            confirmation: "CONF-80412".to_string(),
            fail_navigate: false,
            navigated: AtomicBool::new(false),
            submitted: AtomicU32::new(0),
        }
    }

    fn unreachable_site() -> Self {
        Self {
            fail_navigate: true,
            ..Self::serving("")
        }
    }
}

#[async_trait]
impl RegistrationDriver for ScriptedDriver {
    async fn navigate(&self, _url: &str) -> Result<()> {
        if self.fail_navigate {
            return Err(anyhow!("connection refused"));
        }
        self.navigated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn fill_field(&self, _selector: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn rendered_content(&self) -> Result<String> {
        Ok(self.page.clone())
    }

    async fn submit(&self, _selector: &str) -> Result<String> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(self.confirmation.clone())
    }
}

const CLEAN_PAGE: &str = "<form><label>Child name</label><input name=\"name\">\
                          <input name=\"email\"><input name=\"phone\">\
                          <button type=\"submit\">Register</button></form>";

fn approved_event(cost_cents: u32) -> CanonicalEvent {
    CanonicalEvent {
        id: Uuid::new_v4(),
        fingerprint: Uuid::new_v4().to_string(),
        title: "Storytime at Library".into(),
        starts_at: Utc::now() + chrono::Duration::days(3),
        all_day: false,
        location: Location::default(),
        age_range: None,
        cost_cents,
        registration_url: "https://library.example.com/register".into(),
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

struct Harness {
    store: Arc<MemoryStore>,
    driver: Arc<ScriptedDriver>,
    stop: Arc<EmergencyStop>,
    registrar: Registrar,
}

async fn setup(driver: ScriptedDriver, event: &CanonicalEvent) -> Harness {
    let store = MemoryStore::new();
    store.upsert_event(event).await.unwrap();
    let driver = Arc::new(driver);
    let stop = Arc::new(EmergencyStop::new());
    let registrar = Registrar::new(
        driver.clone(),
        store.clone(),
        store.clone(),
        stop.clone(),
        RegistrantProfile::standard("Jordan Doe", "jordan@example.com", "+16125550100"),
    );
    Harness {
        store,
        driver,
        stop,
        registrar,
    }
}

// ---------------------------------------------------------------------------
// The payment invariant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn paid_event_never_reaches_the_driver() {
    let event = approved_event(1500);
    let h = setup(ScriptedDriver::serving(CLEAN_PAGE), &event).await;

    let err = h.registrar.register(&event).await.unwrap_err();
    let hearth_err = err.downcast_ref::<HearthError>().unwrap();
    assert!(hearth_err.is_safety());

    // The automation collaborator was never invoked.
    assert!(!h.driver.navigated.load(Ordering::SeqCst));
    assert_eq!(h.driver.submitted.load(Ordering::SeqCst), 0);

    // Violation and attempt are both on record.
    assert_eq!(h.store.violation_count().await.unwrap(), 1);
    let attempts = h.store.attempts_for(event.id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].payment_required);
    assert!(!attempts[0].success);
    assert!(!attempts[0].payment_completed());
}

#[tokio::test]
async fn upsell_price_on_free_event_page_aborts_before_submit() {
    // Declared cost zero, but the rendered page shows "$10".
    let event = approved_event(0);
    let page = "<form><input name=\"name\"><div class=\"notice\">$10 at the door</div>\
                <button type=\"submit\">Register</button></form>";
    let h = setup(ScriptedDriver::serving(page), &event).await;

    let err = h.registrar.register(&event).await.unwrap_err();
    assert!(err.downcast_ref::<HearthError>().unwrap().is_safety());

    // Navigation happened, submission never did.
    assert!(h.driver.navigated.load(Ordering::SeqCst));
    assert_eq!(h.driver.submitted.load(Ordering::SeqCst), 0);

    assert_eq!(h.store.violation_count().await.unwrap(), 1);
    assert_eq!(
        h.store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::RegistrationFailed
    );
}

#[tokio::test]
async fn clean_free_event_registers_end_to_end() {
    let event = approved_event(0);
    let h = setup(ScriptedDriver::serving(CLEAN_PAGE), &event).await;

    let attempt = h.registrar.register(&event).await.unwrap();
    assert!(attempt.success);
    assert_eq!(attempt.confirmation_number.as_deref(), Some("CONF-80412"));
    assert!(!attempt.payment_completed());

    assert_eq!(h.driver.submitted.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::Registered
    );
}

#[tokio::test]
async fn ordinary_failure_is_not_a_safety_violation() {
    let event = approved_event(0);
    let h = setup(ScriptedDriver::unreachable_site(), &event).await;

    let attempt = h.registrar.register(&event).await.unwrap();
    assert!(!attempt.success);
    assert!(attempt.error.as_deref().unwrap().contains("connection refused"));

    // No violation recorded; the event can be retried.
    assert_eq!(h.store.violation_count().await.unwrap(), 0);
    assert!(!h.stop.is_tripped());
    assert_eq!(
        h.store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::RegistrationFailed
    );
}

#[tokio::test]
async fn failed_registration_can_retry() {
    let event = approved_event(0);
    let h = setup(ScriptedDriver::serving(CLEAN_PAGE), &event).await;

    // Force the event into the failed state, then register again.
    h.store
        .transition_status(event.id, EventStatus::Approved, EventStatus::Registering)
        .await
        .unwrap();
    h.store
        .transition_status(
            event.id,
            EventStatus::Registering,
            EventStatus::RegistrationFailed,
        )
        .await
        .unwrap();

    let attempt = h.registrar.register(&event).await.unwrap();
    assert!(attempt.success);
    assert_eq!(
        h.store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::Registered
    );
}

#[tokio::test]
async fn emergency_stop_fails_closed() {
    let event = approved_event(1500);
    let h = setup(ScriptedDriver::serving(CLEAN_PAGE), &event).await;

    // Trip the stop with repeated paid-event attempts.
    for _ in 0..3 {
        let _ = h.registrar.register(&event).await;
    }
    assert!(h.stop.is_tripped());

    // Even a clean free event is now refused, without touching the driver.
    let free = approved_event(0);
    h.store.upsert_event(&free).await.unwrap();
    let err = h.registrar.register(&free).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HearthError>(),
        Some(HearthError::EmergencyStop)
    ));
    assert!(!h.driver.navigated.load(Ordering::SeqCst));
}

#[tokio::test]
async fn manual_path_marks_event_without_automation() {
    let event = approved_event(1500);
    let h = setup(ScriptedDriver::serving(CLEAN_PAGE), &event).await;

    h.registrar.manual_path(&event).await.unwrap();

    assert!(!h.driver.navigated.load(Ordering::SeqCst));
    assert_eq!(
        h.store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::ManualRegistrationSent
    );
}

#[tokio::test]
async fn every_recorded_attempt_has_payment_completed_false() {
    let paid = approved_event(1500);
    let h = setup(ScriptedDriver::serving(CLEAN_PAGE), &paid).await;
    let _ = h.registrar.register(&paid).await;

    let free = approved_event(0);
    h.store.upsert_event(&free).await.unwrap();
    let _ = h.registrar.register(&free).await;

    for event_id in [paid.id, free.id] {
        for attempt in h.store.attempts_for(event_id).await.unwrap() {
            assert!(!attempt.payment_completed());
        }
    }
}
