//! Notification/approval state machine lifecycle tests against the
//! in-memory store: first-response-wins, timeout handling, and event status
//! side effects. No network.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use hearth_common::store::{EventStore, MemoryStore, NotificationStore};
use hearth_common::types::{
    CanonicalEvent, Channel, EventStatus, Location, Notification, NotificationStatus,
};
use hearth_notify::{NotificationChannel, Notifier};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct MockChannel {
    kind: Channel,
    fail: bool,
}

#[async_trait]
impl NotificationChannel for MockChannel {
    fn kind(&self) -> Channel {
        self.kind
    }

    async fn deliver(&self, _notification: &Notification) -> Result<String> {
        if self.fail {
            Err(anyhow!("provider unavailable"))
        } else {
            Ok(format!("SM{}", Uuid::new_v4().simple()))
        }
    }
}

fn proposed_event() -> CanonicalEvent {
    CanonicalEvent {
        id: Uuid::new_v4(),
        fingerprint: Uuid::new_v4().to_string(),
        title: "Storytime at Library".into(),
        starts_at: Utc::now() + Duration::days(3),
        all_day: false,
        location: Location {
            address: "300 Nicollet Mall".into(),
            lat: Some(44.9778),
            lng: Some(-93.2650),
        },
        age_range: None,
        cost_cents: 0,
        registration_url: "https://library.example.com/storytime".into(),
        alternate_urls: vec![],
        registration_opens_at: None,
        capacity: None,
        description: "Weekly storytime".into(),
        status: EventStatus::Proposed,
        sources: ["library".to_string()].into(),
        merge_count: 1,
        first_seen: Utc::now(),
        last_merged_at: None,
        filter: None,
        score: None,
    }
}

async fn setup(fail: bool) -> (Arc<MemoryStore>, Notifier, CanonicalEvent) {
    let store = MemoryStore::new();
    let event = proposed_event();
    store.upsert_event(&event).await.unwrap();

    let notifier = Notifier::new(store.clone(), store.clone()).with_channel(Arc::new(
        MockChannel {
            kind: Channel::Sms,
            fail,
        },
    ));
    (store, notifier, event)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sms_send_lands_pending_with_provider_id() {
    let (_store, notifier, event) = setup(false).await;

    let notification = notifier
        .send(&event, "+16125550100", Channel::Sms)
        .await
        .unwrap();

    assert_eq!(notification.status, NotificationStatus::Pending);
    assert!(notification.provider_message_id.is_some());
    assert!(notification.subject.is_none());
}

#[tokio::test]
async fn first_response_wins_second_is_audit_only() {
    // Scenario: SMS at T, "yes approve" at T+2h, second reply at T+3h.
    let (store, notifier, event) = setup(false).await;
    let sent = notifier
        .send(&event, "+16125550100", Channel::Sms)
        .await
        .unwrap();

    let t = sent.sent_at;
    let first = notifier
        .record_response(sent.id, "yes approve", t + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(first.status, NotificationStatus::Approved);
    assert_eq!(
        store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::Approved
    );

    let second = notifier
        .record_response(sent.id, "no wait, cancel", t + Duration::hours(3))
        .await
        .unwrap();
    assert_eq!(second.status, NotificationStatus::Approved);
    assert_eq!(second.response_text.as_deref(), Some("yes approve"));
    assert_eq!(store.unmatched_response_count().await, 1);
    assert_eq!(
        store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::Approved
    );
}

#[tokio::test]
async fn rejection_drives_event_to_rejected() {
    let (store, notifier, event) = setup(false).await;
    let sent = notifier
        .send(&event, "+16125550100", Channel::Sms)
        .await
        .unwrap();

    notifier
        .record_response(sent.id, "no thanks, skip", sent.sent_at + Duration::hours(1))
        .await
        .unwrap();

    assert_eq!(
        store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::Rejected
    );
}

#[tokio::test]
async fn unclear_response_leaves_event_proposed() {
    let (store, notifier, event) = setup(false).await;
    let sent = notifier
        .send(&event, "+16125550100", Channel::Sms)
        .await
        .unwrap();

    let n = notifier
        .record_response(sent.id, "what time is it?", sent.sent_at + Duration::hours(1))
        .await
        .unwrap();

    assert_eq!(n.status, NotificationStatus::Unclear);
    assert_eq!(
        store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::Proposed
    );
}

#[tokio::test]
async fn late_response_is_recorded_but_not_applied() {
    let (store, notifier, event) = setup(false).await;
    let sent = notifier
        .send(&event, "+16125550100", Channel::Sms)
        .await
        .unwrap();

    let late = sent.sent_at + Duration::hours(25);
    let n = notifier.record_response(sent.id, "yes", late).await.unwrap();

    assert_eq!(n.status, NotificationStatus::Pending);
    assert_eq!(store.unmatched_response_count().await, 1);
    assert_eq!(
        store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::Proposed
    );
}

#[tokio::test]
async fn inbound_attributes_to_most_recent_open_notification() {
    let (store, notifier, event) = setup(false).await;
    let second_event = proposed_event();
    store.upsert_event(&second_event).await.unwrap();

    notifier
        .send(&event, "+16125550100", Channel::Sms)
        .await
        .unwrap();
    // Later notification for the same recipient.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    notifier
        .send(&second_event, "+16125550100", Channel::Sms)
        .await
        .unwrap();

    let applied = notifier
        .handle_inbound("+16125550100", "yes", Utc::now())
        .await
        .unwrap()
        .expect("should attribute to an open notification");

    assert_eq!(applied.event_id, second_event.id);
}

#[tokio::test]
async fn unmatched_inbound_is_logged_not_applied() {
    let (store, notifier, _event) = setup(false).await;

    let result = notifier
        .handle_inbound("+19998887777", "yes", Utc::now())
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(store.unmatched_response_count().await, 1);
}

#[tokio::test]
async fn timeout_sweep_cancels_notification_and_event() {
    let (store, notifier, event) = setup(false).await;
    let mut sent = notifier
        .send(&event, "+16125550100", Channel::Sms)
        .await
        .unwrap();

    // Backdate past the response window.
    sent.sent_at = Utc::now() - Duration::hours(30);
    store.update_notification(&sent).await.unwrap();

    let cancelled = notifier.sweep_timeouts(Utc::now()).await.unwrap();
    assert_eq!(cancelled, 1);

    let swept = store.get_notification(sent.id).await.unwrap().unwrap();
    assert_eq!(swept.status, NotificationStatus::Cancelled);
    assert_eq!(
        store.get_event(event.id).await.unwrap().unwrap().status,
        EventStatus::Cancelled
    );
}

#[tokio::test]
async fn exhausted_delivery_marks_failed_with_retry_count() {
    let (store, notifier, event) = setup(true).await;

    let notification = notifier
        .send(&event, "+16125550100", Channel::Sms)
        .await
        .unwrap();

    assert_eq!(notification.status, NotificationStatus::Failed);
    assert_eq!(notification.retry_count, 3);

    let stored = store
        .get_notification(notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, NotificationStatus::Failed);
}
