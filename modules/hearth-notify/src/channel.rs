//! Channel-agnostic delivery seam. SMS and email share one notification
//! shape and one lifecycle; only delivery differs.

use anyhow::Result;
use async_trait::async_trait;

use hearth_common::types::{Channel, Notification};

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> Channel;

    /// Deliver the message. Returns the provider message id.
    async fn deliver(&self, notification: &Notification) -> Result<String>;
}
