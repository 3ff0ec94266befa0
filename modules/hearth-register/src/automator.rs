//! Registration automation over the browser-automation collaborator.
//!
//! `register()` is the only way automation reaches an external form, and
//! every path through it runs the safety guard first: cost check before the
//! driver is touched, page scan before anything is submitted. Every attempt
//! is recorded, whether it succeeds, fails, or aborts on a safety signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tracing::{error, info, warn};

use formrunner_client::FormRunnerClient;
use hearth_common::store::{EventStore, RegistrationStore};
use hearth_common::types::{
    AttemptOutcome, CanonicalEvent, EventStatus, RegistrationAttempt,
};
use hearth_common::HearthError;

use crate::guard::{paid_event_violation, preflight_check, scan_rendered_page, EmergencyStop};

/// Retry policy for opening the registration page. Submission is never
/// retried; it is not idempotent.
const NAVIGATE_MAX_ATTEMPTS: u32 = 3;
const NAVIGATE_RETRY_BASE: Duration = Duration::from_millis(500);

const AUTOMATION_ACTOR: &str = "automation";

// ---------------------------------------------------------------------------
// RegistrationDriver: the browser-automation boundary
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RegistrationDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn fill_field(&self, selector: &str, value: &str) -> Result<()>;

    /// Fully-rendered page content, scanned by the guard before submission.
    async fn rendered_content(&self) -> Result<String>;

    /// Submit the form. Returns the confirmation text the page settles on.
    async fn submit(&self, selector: &str) -> Result<String>;
}

#[async_trait]
impl RegistrationDriver for FormRunnerClient {
    async fn navigate(&self, url: &str) -> Result<()> {
        Ok(self.navigate(url).await?)
    }

    async fn fill_field(&self, selector: &str, value: &str) -> Result<()> {
        Ok(self.fill_field(selector, value).await?)
    }

    async fn rendered_content(&self) -> Result<String> {
        Ok(self.rendered_content().await?)
    }

    async fn submit(&self, selector: &str) -> Result<String> {
        Ok(self.submit(selector).await?)
    }
}

// ---------------------------------------------------------------------------
// Registrant profile
// ---------------------------------------------------------------------------

/// Field values typed into registration forms, keyed by selector.
#[derive(Debug, Clone)]
pub struct RegistrantProfile {
    pub fields: Vec<(String, String)>,
    pub submit_selector: String,
}

impl RegistrantProfile {
    /// The common registration-form shape: name, email, phone.
    pub fn standard(name: &str, email: &str, phone: &str) -> Self {
        Self {
            fields: vec![
                ("input[name=\"name\"]".into(), name.to_string()),
                ("input[name=\"email\"]".into(), email.to_string()),
                ("input[name=\"phone\"]".into(), phone.to_string()),
            ],
            submit_selector: "button[type=\"submit\"]".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registrar
// ---------------------------------------------------------------------------

pub struct Registrar {
    driver: Arc<dyn RegistrationDriver>,
    store: Arc<dyn RegistrationStore>,
    events: Arc<dyn EventStore>,
    stop: Arc<EmergencyStop>,
    profile: RegistrantProfile,
}

impl Registrar {
    pub fn new(
        driver: Arc<dyn RegistrationDriver>,
        store: Arc<dyn RegistrationStore>,
        events: Arc<dyn EventStore>,
        stop: Arc<EmergencyStop>,
        profile: RegistrantProfile,
    ) -> Self {
        Self {
            driver,
            store,
            events,
            stop,
            profile,
        }
    }

    /// Attempt unattended registration for an approved, free event.
    ///
    /// Safety aborts return `Err` with a safety-class error; ordinary
    /// automation failures return the recorded attempt with
    /// `success == false`.
    pub async fn register(&self, event: &CanonicalEvent) -> Result<RegistrationAttempt> {
        if self.stop.is_tripped() {
            error!(
                event = %event.title,
                violations = self.stop.violation_count(),
                "Emergency stop engaged; refusing to register"
            );
            self.record_attempt(
                event,
                AttemptOutcome {
                    success: false,
                    confirmation_number: None,
                    error: Some("emergency stop engaged".into()),
                    payment_required: false,
                    payment_amount_cents: None,
                },
            )
            .await?;
            return Err(HearthError::EmergencyStop.into());
        }

        // Pre-flight cost guard. Happens before any driver call; there is
        // no interleaving in which automation touches a paid event's form.
        if let Err(violation_err) = preflight_check(event) {
            self.store.append_violation(&paid_event_violation(event)).await?;
            let total = self.stop.record_violation();
            error!(
                event = %event.title,
                cost_cents = event.cost_cents,
                violations = total,
                "Payment safety violation: automation invoked on a paid event"
            );
            self.record_attempt(
                event,
                AttemptOutcome {
                    success: false,
                    confirmation_number: None,
                    error: Some(violation_err.to_string()),
                    payment_required: true,
                    payment_amount_cents: Some(event.cost_cents),
                },
            )
            .await?;
            return Err(violation_err.into());
        }

        if !self.claim_for_registration(event).await? {
            return Err(HearthError::Registration(format!(
                "event {} is not in a registrable state",
                event.id
            ))
            .into());
        }

        match self.drive_form(event).await {
            Ok(confirmation) => {
                let attempt = self
                    .record_attempt(
                        event,
                        AttemptOutcome {
                            success: true,
                            confirmation_number: Some(confirmation),
                            error: None,
                            payment_required: false,
                            payment_amount_cents: None,
                        },
                    )
                    .await?;
                self.events
                    .transition_status(event.id, EventStatus::Registering, EventStatus::Registered)
                    .await?;
                info!(event = %event.title, "Registration complete");
                Ok(attempt)
            }
            Err(DriveError::PaymentSignals(violations)) => {
                for violation in &violations {
                    self.store.append_violation(violation).await?;
                }
                let total = self.stop.record_violation();
                let detail = violations
                    .iter()
                    .map(|v| format!("{}: {}", v.kind, v.detail))
                    .collect::<Vec<_>>()
                    .join("; ");
                error!(
                    event = %event.title,
                    violations = total,
                    detail = %detail,
                    "Payment signal on registration page; aborting before submit"
                );
                self.record_attempt(
                    event,
                    AttemptOutcome {
                        success: false,
                        confirmation_number: None,
                        error: Some(format!("payment signal detected: {detail}")),
                        payment_required: true,
                        payment_amount_cents: None,
                    },
                )
                .await?;
                self.events
                    .transition_status(
                        event.id,
                        EventStatus::Registering,
                        EventStatus::RegistrationFailed,
                    )
                    .await?;
                Err(HearthError::SafetyViolation(detail).into())
            }
            Err(DriveError::Automation(error)) => {
                warn!(event = %event.title, %error, "Registration automation failed");
                let attempt = self
                    .record_attempt(
                        event,
                        AttemptOutcome {
                            success: false,
                            confirmation_number: None,
                            error: Some(error.to_string()),
                            payment_required: false,
                            payment_amount_cents: None,
                        },
                    )
                    .await?;
                self.events
                    .transition_status(
                        event.id,
                        EventStatus::Registering,
                        EventStatus::RegistrationFailed,
                    )
                    .await?;
                Ok(attempt)
            }
        }
    }

    /// The manual alternative for events automation must not touch: mark
    /// the event so the household gets the registration link instead.
    pub async fn manual_path(&self, event: &CanonicalEvent) -> Result<()> {
        let applied = self
            .events
            .transition_status(
                event.id,
                EventStatus::Approved,
                EventStatus::ManualRegistrationSent,
            )
            .await?;
        if applied {
            info!(event = %event.title, "Manual registration path taken");
        }
        Ok(())
    }

    /// Conditional move into `registering`, accepting either a fresh
    /// approval or a retry after a failed attempt.
    async fn claim_for_registration(&self, event: &CanonicalEvent) -> Result<bool> {
        if self
            .events
            .transition_status(event.id, EventStatus::Approved, EventStatus::Registering)
            .await?
        {
            return Ok(true);
        }
        self.events
            .transition_status(
                event.id,
                EventStatus::RegistrationFailed,
                EventStatus::Registering,
            )
            .await
    }

    async fn drive_form(&self, event: &CanonicalEvent) -> std::result::Result<String, DriveError> {
        self.navigate_with_retry(&event.registration_url).await?;

        for (selector, value) in &self.profile.fields {
            self.driver
                .fill_field(selector, value)
                .await
                .map_err(DriveError::Automation)?;
        }

        // Page guard: the scan sits between fill and submit, so nothing is
        // ever submitted past an unscanned page.
        let content = self
            .driver
            .rendered_content()
            .await
            .map_err(DriveError::Automation)?;
        let violations = scan_rendered_page(event.id, &content);
        if !violations.is_empty() {
            return Err(DriveError::PaymentSignals(violations));
        }

        self.driver
            .submit(&self.profile.submit_selector)
            .await
            .map_err(DriveError::Automation)
    }

    async fn navigate_with_retry(&self, url: &str) -> std::result::Result<(), DriveError> {
        for attempt in 0..NAVIGATE_MAX_ATTEMPTS {
            match self.driver.navigate(url).await {
                Ok(()) => return Ok(()),
                Err(error) if attempt + 1 < NAVIGATE_MAX_ATTEMPTS => {
                    let backoff = NAVIGATE_RETRY_BASE * 3u32.pow(attempt);
                    let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                    warn!(url, attempt = attempt + 1, %error, "Navigation failed, retrying");
                    tokio::time::sleep(backoff + jitter).await;
                }
                Err(error) => return Err(DriveError::Automation(error)),
            }
        }
        unreachable!("loop returns on success or final failure")
    }

    async fn record_attempt(
        &self,
        event: &CanonicalEvent,
        outcome: AttemptOutcome,
    ) -> Result<RegistrationAttempt> {
        let attempt =
            RegistrationAttempt::record(event.id, outcome, AUTOMATION_ACTOR, Utc::now());
        self.store.append_attempt(&attempt).await?;
        Ok(attempt)
    }
}

enum DriveError {
    /// Payment signals found by the page guard. Safety class.
    PaymentSignals(Vec<hearth_common::types::PaymentViolation>),
    /// Ordinary automation failure (network, missing field, …).
    Automation(anyhow::Error),
}
