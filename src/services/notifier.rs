use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::UserId;

/// Errors that can occur when dispatching a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Webhook rejected notification: {0}")]
    Rejected(String),
}

/// Connection lifecycle transitions that notify the other party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    ConnectionRequested,
    ConnectionAccepted,
}

/// Fire-and-forget delivery of lifecycle notifications
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(
        &self,
        event: NotificationEvent,
        recipient_id: UserId,
        actor_id: UserId,
    ) -> Result<(), NotifyError>;
}

/// Dispatcher used when no webhook is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify(
        &self,
        event: NotificationEvent,
        recipient_id: UserId,
        actor_id: UserId,
    ) -> Result<(), NotifyError> {
        tracing::info!("Notification {:?}: {} -> {}", event, actor_id, recipient_id);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct NotificationPayload {
    id: String,
    event_type: NotificationEvent,
    recipient_id: UserId,
    actor_id: UserId,
    sent_at: chrono::DateTime<chrono::Utc>,
}

/// Posts notifications as JSON to the push delivery service
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout_secs: u64) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { url, client })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn notify(
        &self,
        event: NotificationEvent,
        recipient_id: UserId,
        actor_id: UserId,
    ) -> Result<(), NotifyError> {
        let payload = NotificationPayload {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event,
            recipient_id,
            actor_id,
            sent_at: chrono::Utc::now(),
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }

        tracing::debug!("Delivered {:?} notification to {}", event, recipient_id);
        Ok(())
    }
}
