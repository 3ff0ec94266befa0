//! SMS delivery over the Twilio Messages API.

use anyhow::Result;
use async_trait::async_trait;

use hearth_common::types::{Channel, Notification};
use twilio::TwilioClient;

use crate::channel::NotificationChannel;

pub struct SmsChannel {
    client: TwilioClient,
    from: String,
}

impl SmsChannel {
    pub fn new(client: TwilioClient, from: &str) -> Self {
        Self {
            client,
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn kind(&self) -> Channel {
        Channel::Sms
    }

    async fn deliver(&self, notification: &Notification) -> Result<String> {
        let message = self
            .client
            .send_message(&self.from, &notification.recipient, &notification.body)
            .await?;
        Ok(message.sid)
    }
}
