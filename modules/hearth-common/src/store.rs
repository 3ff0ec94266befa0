// Trait abstractions over the persistent store.
//
// EventStore / NotificationStore / RegistrationStore: all durable reads and
// writes behind traits, with stage transitions expressed as conditional
// updates keyed by identity (fingerprint / notification id) so overlapping
// runs cannot lose updates.
//
// MemoryStore is the reference implementation backing tests and single-run
// tooling: no network, no database, no Docker.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::HearthError;
use crate::types::{
    CanonicalEvent, EventStatus, MergeRecord, Notification, PaymentViolation,
    RegistrationAttempt,
};

// ---------------------------------------------------------------------------
// EventStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Look up the canonical event holding this fingerprint.
    async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<CanonicalEvent>>;

    async fn get_event(&self, id: Uuid) -> Result<Option<CanonicalEvent>>;

    /// All canonical events whose status is not terminal.
    async fn active_events(&self) -> Result<Vec<CanonicalEvent>>;

    /// Insert or replace a canonical event. Exactly one event may hold a
    /// given fingerprint; a second id claiming the same fingerprint is an
    /// error.
    async fn upsert_event(&self, event: &CanonicalEvent) -> Result<()>;

    /// Conditional status transition keyed by id. Applies only when the
    /// current status equals `from`; returns false on a stale precondition.
    /// An illegal `from -> to` pair is an error regardless of current state.
    async fn transition_status(&self, id: Uuid, from: EventStatus, to: EventStatus)
        -> Result<bool>;

    async fn append_merge_record(&self, record: &MergeRecord) -> Result<()>;

    async fn merge_records_for(&self, primary_id: Uuid) -> Result<Vec<MergeRecord>>;

    /// Fingerprints of events the household has attended (registered events
    /// plus any manually marked history).
    async fn attended_fingerprints(&self) -> Result<BTreeSet<String>>;

    /// Serialize discovery runs: returns false when another run holds the
    /// lock.
    async fn acquire_run_lock(&self, run_id: Uuid) -> Result<bool>;

    async fn release_run_lock(&self, run_id: Uuid) -> Result<()>;

    /// Retention policy, the only hard-delete path. Removes events first
    /// seen before `cutoff` along with their merge records. Registered
    /// events are kept as attendance history.
    async fn reap_events_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// NotificationStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    async fn update_notification(&self, notification: &Notification) -> Result<()>;

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>>;

    /// Open notifications for a recipient sent at or after `since`, most
    /// recent first. Drives inbound-reply attribution.
    async fn open_notifications_for(
        &self,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Notification>>;

    /// Open notifications sent before `cutoff`, the timeout sweep input.
    async fn open_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Notification>>;

    /// Audit log for inbound responses that did not change any
    /// notification's status (unmatched, late, or duplicate).
    async fn record_unmatched_response(
        &self,
        recipient: &str,
        raw_text: &str,
        received_at: DateTime<Utc>,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// RegistrationStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn append_attempt(&self, attempt: &RegistrationAttempt) -> Result<()>;

    async fn attempts_for(&self, event_id: Uuid) -> Result<Vec<RegistrationAttempt>>;

    async fn append_violation(&self, violation: &PaymentViolation) -> Result<()>;

    async fn violation_count(&self) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// MemoryStore: reference implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    events: HashMap<Uuid, CanonicalEvent>,
    fingerprints: HashMap<String, Uuid>,
    merges: Vec<MergeRecord>,
    notifications: HashMap<Uuid, Notification>,
    unmatched_responses: Vec<(String, String, DateTime<Utc>)>,
    attempts: Vec<RegistrationAttempt>,
    violations: Vec<PaymentViolation>,
    attended: BTreeSet<String>,
    run_lock: Option<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: tokio::sync::Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a fingerprint as attended without a registered event (history
    /// import, manual bookkeeping).
    pub async fn mark_attended(&self, fingerprint: &str) {
        let mut inner = self.inner.lock().await;
        inner.attended.insert(fingerprint.to_string());
    }

    /// Number of unmatched/late responses kept for audit.
    pub async fn unmatched_response_count(&self) -> usize {
        self.inner.lock().await.unmatched_responses.len()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<CanonicalEvent>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .fingerprints
            .get(fingerprint)
            .and_then(|id| inner.events.get(id))
            .cloned())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<CanonicalEvent>> {
        Ok(self.inner.lock().await.events.get(&id).cloned())
    }

    async fn active_events(&self) -> Result<Vec<CanonicalEvent>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .values()
            .filter(|e| !e.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn upsert_event(&self, event: &CanonicalEvent) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.fingerprints.get(&event.fingerprint) {
            if *existing != event.id {
                return Err(HearthError::Store(format!(
                    "fingerprint {} already held by another event",
                    event.fingerprint
                ))
                .into());
            }
        }
        inner
            .fingerprints
            .insert(event.fingerprint.clone(), event.id);
        inner.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: EventStatus,
        to: EventStatus,
    ) -> Result<bool> {
        if !from.can_transition(to) {
            return Err(HearthError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(event) = inner.events.get_mut(&id) else {
            return Err(HearthError::Store(format!("no event {id}")).into());
        };
        if event.status != from {
            return Ok(false);
        }
        event.status = to;
        if to == EventStatus::Registered {
            inner.attended.insert(event.fingerprint.clone());
        }
        Ok(true)
    }

    async fn append_merge_record(&self, record: &MergeRecord) -> Result<()> {
        self.inner.lock().await.merges.push(record.clone());
        Ok(())
    }

    async fn merge_records_for(&self, primary_id: Uuid) -> Result<Vec<MergeRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .merges
            .iter()
            .filter(|m| m.primary_id == primary_id)
            .cloned()
            .collect())
    }

    async fn attended_fingerprints(&self) -> Result<BTreeSet<String>> {
        Ok(self.inner.lock().await.attended.clone())
    }

    async fn acquire_run_lock(&self, run_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.run_lock {
            Some(holder) if holder != run_id => Ok(false),
            _ => {
                inner.run_lock = Some(run_id);
                Ok(true)
            }
        }
    }

    async fn release_run_lock(&self, run_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.run_lock == Some(run_id) {
            inner.run_lock = None;
        }
        Ok(())
    }

    async fn reap_events_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let doomed: Vec<Uuid> = inner
            .events
            .values()
            .filter(|e| e.first_seen < cutoff && e.status != EventStatus::Registered)
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            if let Some(event) = inner.events.remove(id) {
                inner.fingerprints.remove(&event.fingerprint);
            }
            inner.merges.retain(|m| m.primary_id != *id);
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.inner
            .lock()
            .await
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn update_notification(&self, notification: &Notification) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.notifications.contains_key(&notification.id) {
            return Err(
                HearthError::Store(format!("no notification {}", notification.id)).into(),
            );
        }
        inner
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.inner.lock().await.notifications.get(&id).cloned())
    }

    async fn open_notifications_for(
        &self,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {
        let inner = self.inner.lock().await;
        let mut open: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.recipient == recipient && n.status.is_open() && n.sent_at >= since)
            .cloned()
            .collect();
        open.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(open)
    }

    async fn open_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Notification>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .values()
            .filter(|n| n.status.is_open() && n.sent_at < cutoff)
            .cloned()
            .collect())
    }

    async fn record_unmatched_response(
        &self,
        recipient: &str,
        raw_text: &str,
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.lock().await.unmatched_responses.push((
            recipient.to_string(),
            raw_text.to_string(),
            received_at,
        ));
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn append_attempt(&self, attempt: &RegistrationAttempt) -> Result<()> {
        self.inner.lock().await.attempts.push(attempt.clone());
        Ok(())
    }

    async fn attempts_for(&self, event_id: Uuid) -> Result<Vec<RegistrationAttempt>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .attempts
            .iter()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn append_violation(&self, violation: &PaymentViolation) -> Result<()> {
        self.inner.lock().await.violations.push(violation.clone());
        Ok(())
    }

    async fn violation_count(&self) -> Result<u64> {
        Ok(self.inner.lock().await.violations.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Location;
    use std::collections::BTreeSet;

    fn test_event(fingerprint: &str) -> CanonicalEvent {
        CanonicalEvent {
            id: Uuid::new_v4(),
            fingerprint: fingerprint.to_string(),
            title: "Storytime at Library".into(),
            starts_at: Utc::now() + chrono::Duration::days(7),
            all_day: false,
            location: Location {
                address: "300 Nicollet Mall".into(),
                lat: Some(44.9778),
                lng: Some(-93.265),
            },
            age_range: None,
            cost_cents: 0,
            registration_url: "https://library.example.com/storytime".into(),
            alternate_urls: vec![],
            registration_opens_at: None,
            capacity: None,
            description: "Weekly storytime".into(),
            status: EventStatus::Discovered,
            sources: BTreeSet::from(["library".to_string()]),
            merge_count: 1,
            first_seen: Utc::now(),
            last_merged_at: None,
            filter: None,
            score: None,
        }
    }

    #[tokio::test]
    async fn fingerprint_maps_to_single_event() {
        let store = MemoryStore::new();
        let event = test_event("fp-1");
        store.upsert_event(&event).await.unwrap();

        let mut imposter = test_event("fp-1");
        imposter.id = Uuid::new_v4();
        assert!(store.upsert_event(&imposter).await.is_err());
    }

    #[tokio::test]
    async fn conditional_transition_detects_stale_precondition() {
        let store = MemoryStore::new();
        let event = test_event("fp-2");
        store.upsert_event(&event).await.unwrap();

        let applied = store
            .transition_status(event.id, EventStatus::Discovered, EventStatus::Proposed)
            .await
            .unwrap();
        assert!(applied);

        // A second writer still believing the event is discovered loses.
        let applied = store
            .transition_status(event.id, EventStatus::Discovered, EventStatus::Proposed)
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn illegal_transition_is_an_error() {
        let store = MemoryStore::new();
        let event = test_event("fp-3");
        store.upsert_event(&event).await.unwrap();

        let result = store
            .transition_status(event.id, EventStatus::Discovered, EventStatus::Registered)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn registered_event_becomes_attended_history() {
        let store = MemoryStore::new();
        let mut event = test_event("fp-4");
        event.status = EventStatus::Registering;
        store.upsert_event(&event).await.unwrap();

        store
            .transition_status(event.id, EventStatus::Registering, EventStatus::Registered)
            .await
            .unwrap();

        let attended = store.attended_fingerprints().await.unwrap();
        assert!(attended.contains("fp-4"));
    }

    #[tokio::test]
    async fn run_lock_is_exclusive() {
        let store = MemoryStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(store.acquire_run_lock(first).await.unwrap());
        assert!(!store.acquire_run_lock(second).await.unwrap());
        store.release_run_lock(first).await.unwrap();
        assert!(store.acquire_run_lock(second).await.unwrap());
    }

    #[tokio::test]
    async fn reap_keeps_registered_events() {
        let store = MemoryStore::new();
        let mut old_registered = test_event("fp-old-reg");
        old_registered.first_seen = Utc::now() - chrono::Duration::days(400);
        old_registered.status = EventStatus::Registered;
        store.upsert_event(&old_registered).await.unwrap();

        let mut old_cancelled = test_event("fp-old-can");
        old_cancelled.first_seen = Utc::now() - chrono::Duration::days(400);
        old_cancelled.status = EventStatus::Cancelled;
        store.upsert_event(&old_cancelled).await.unwrap();

        let reaped = store
            .reap_events_older_than(Utc::now() - chrono::Duration::days(365))
            .await
            .unwrap();
        assert_eq!(reaped, 1);
        assert!(store
            .get_by_fingerprint("fp-old-reg")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_by_fingerprint("fp-old-can")
            .await
            .unwrap()
            .is_none());
    }
}
