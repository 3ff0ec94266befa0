//! The notification/approval state machine.
//!
//! `sent -> {pending, delivered} -> {approved, rejected, unclear,
//! cancelled}`, with timeout to cancelled after the response window. The
//! first response wins; later or unmatched replies are kept for audit but
//! never change status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use hearth_common::store::{EventStore, NotificationStore};
use hearth_common::types::{
    CanonicalEvent, Channel, EventStatus, Notification, NotificationStatus,
    RESPONSE_WINDOW_HOURS,
};

use crate::channel::NotificationChannel;
use crate::responder::{classify_response, ResponseClass};

/// Delivery retry policy: base * 3^attempt plus 0-1s jitter.
const DELIVERY_MAX_ATTEMPTS: u32 = 3;
const DELIVERY_RETRY_BASE: Duration = Duration::from_millis(500);

pub struct Notifier {
    notifications: Arc<dyn NotificationStore>,
    events: Arc<dyn EventStore>,
    channels: HashMap<Channel, Arc<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        events: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            notifications,
            events,
            channels: HashMap::new(),
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    /// Send an approval request for an event. The notification is recorded
    /// as `sent` before delivery; delivery retries transient failures and
    /// marks the notification `failed` when attempts are exhausted.
    pub async fn send(
        &self,
        event: &CanonicalEvent,
        recipient: &str,
        channel: Channel,
    ) -> Result<Notification> {
        let sender = self
            .channels
            .get(&channel)
            .ok_or_else(|| anyhow!("no {channel} channel configured"))?;

        let mut notification = Notification {
            id: Uuid::new_v4(),
            event_id: event.id,
            recipient: recipient.to_string(),
            channel,
            subject: match channel {
                Channel::Email => Some(format!("Approval needed: {}", event.title)),
                Channel::Sms => None,
            },
            body: compose_body(event),
            status: NotificationStatus::Sent,
            response_text: None,
            responded_at: None,
            provider_message_id: None,
            retry_count: 0,
            sent_at: Utc::now(),
        };
        self.notifications.insert_notification(&notification).await?;

        for attempt in 0..DELIVERY_MAX_ATTEMPTS {
            match sender.deliver(&notification).await {
                Ok(message_id) => {
                    notification.provider_message_id = Some(message_id);
                    notification.status = match channel {
                        Channel::Sms => NotificationStatus::Pending,
                        Channel::Email => NotificationStatus::Delivered,
                    };
                    self.notifications.update_notification(&notification).await?;
                    info!(
                        notification_id = %notification.id,
                        event = %event.title,
                        %channel,
                        "Approval request sent"
                    );
                    return Ok(notification);
                }
                Err(error) => {
                    notification.retry_count = attempt + 1;
                    if attempt + 1 < DELIVERY_MAX_ATTEMPTS {
                        let backoff = DELIVERY_RETRY_BASE * 3u32.pow(attempt);
                        let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                        warn!(
                            notification_id = %notification.id,
                            attempt = attempt + 1,
                            %error,
                            "Delivery failed, retrying after backoff"
                        );
                        tokio::time::sleep(backoff + jitter).await;
                    } else {
                        warn!(notification_id = %notification.id, %error, "Delivery failed, giving up");
                    }
                }
            }
        }

        notification.status = NotificationStatus::Failed;
        self.notifications.update_notification(&notification).await?;
        Ok(notification)
    }

    /// Apply an inbound response to a specific notification. The first
    /// response settles the status. Anything after that, or anything
    /// arriving outside the response window, is recorded for audit only.
    pub async fn record_response(
        &self,
        notification_id: Uuid,
        raw_text: &str,
        now: DateTime<Utc>,
    ) -> Result<Notification> {
        let mut notification = self
            .notifications
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| anyhow!("no notification {notification_id}"))?;

        if !notification.accepts_response(now) {
            self.notifications
                .record_unmatched_response(&notification.recipient, raw_text, now)
                .await?;
            info!(
                notification_id = %notification.id,
                status = %notification.status,
                "Response recorded for audit only; status already settled"
            );
            return Ok(notification);
        }

        let class = classify_response(raw_text);
        notification.response_text = Some(raw_text.to_string());
        notification.responded_at = Some(now);
        notification.status = match class {
            ResponseClass::Approved => NotificationStatus::Approved,
            ResponseClass::Rejected => NotificationStatus::Rejected,
            ResponseClass::Unclear => NotificationStatus::Unclear,
        };
        self.notifications.update_notification(&notification).await?;

        match class {
            ResponseClass::Approved => {
                self.events
                    .transition_status(
                        notification.event_id,
                        EventStatus::Proposed,
                        EventStatus::Approved,
                    )
                    .await?;
            }
            ResponseClass::Rejected => {
                self.events
                    .transition_status(
                        notification.event_id,
                        EventStatus::Proposed,
                        EventStatus::Rejected,
                    )
                    .await?;
            }
            // Unclear leaves the event untouched for human follow-up.
            ResponseClass::Unclear => {}
        }

        info!(
            notification_id = %notification.id,
            status = %notification.status,
            "Response applied"
        );
        Ok(notification)
    }

    /// Attribute a raw inbound message to the most recent open notification
    /// for that recipient within the lookback window. Unmatched messages
    /// are logged, not applied.
    pub async fn handle_inbound(
        &self,
        recipient: &str,
        raw_text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        let lookback = now - chrono::Duration::hours(RESPONSE_WINDOW_HOURS);
        let open = self
            .notifications
            .open_notifications_for(recipient, lookback)
            .await?;

        match open.into_iter().next() {
            Some(notification) => Ok(Some(
                self.record_response(notification.id, raw_text, now).await?,
            )),
            None => {
                warn!(recipient, "Inbound response matched no open notification");
                self.notifications
                    .record_unmatched_response(recipient, raw_text, now)
                    .await?;
                Ok(None)
            }
        }
    }

    /// Cancel notifications whose response window has lapsed, cancelling
    /// their still-proposed events with them. Returns how many timed out.
    pub async fn sweep_timeouts(&self, now: DateTime<Utc>) -> Result<u32> {
        let cutoff = now - chrono::Duration::hours(RESPONSE_WINDOW_HOURS);
        let stale = self.notifications.open_notifications_before(cutoff).await?;

        let mut cancelled = 0u32;
        for mut notification in stale {
            notification.status = NotificationStatus::Cancelled;
            self.notifications.update_notification(&notification).await?;
            self.events
                .transition_status(
                    notification.event_id,
                    EventStatus::Proposed,
                    EventStatus::Cancelled,
                )
                .await?;
            cancelled += 1;
        }

        if cancelled > 0 {
            info!(cancelled, "Timed-out notifications cancelled");
        }
        Ok(cancelled)
    }
}

fn compose_body(event: &CanonicalEvent) -> String {
    let cost = if event.is_free() {
        "free".to_string()
    } else {
        format!("${:.2}", event.cost_cents as f64 / 100.0)
    };
    let venue = if event.location.address.is_empty() {
        String::new()
    } else {
        format!(" at {}", event.location.address)
    };
    format!(
        "Found: {} on {}{} ({}). Reply YES to approve or NO to skip.",
        event.title,
        event.starts_at.format("%a %b %e, %H:%M"),
        venue,
        cost
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_mentions_title_cost_and_reply_vocabulary() {
        let event = test_event();
        let body = compose_body(&event);
        assert!(body.contains("Storytime"));
        assert!(body.contains("free"));
        assert!(body.contains("Reply YES"));
    }

    fn test_event() -> CanonicalEvent {
        CanonicalEvent {
            id: Uuid::new_v4(),
            fingerprint: "fp".into(),
            title: "Storytime".into(),
            starts_at: Utc::now() + chrono::Duration::days(3),
            all_day: false,
            location: hearth_common::types::Location::default(),
            age_range: None,
            cost_cents: 0,
            registration_url: String::new(),
            alternate_urls: vec![],
            registration_opens_at: None,
            capacity: None,
            description: String::new(),
            status: EventStatus::Proposed,
            sources: Default::default(),
            merge_count: 1,
            first_seen: Utc::now(),
            last_merged_at: None,
            filter: None,
            score: None,
        }
    }
}
