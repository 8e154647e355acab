//! Outbound messaging provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::MessagingConfig;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Whatsapp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub recipient: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("messaging provider unreachable: {0}")]
    Transport(String),

    #[error("messaging provider rejected the message: {0}")]
    Rejected(String),

    #[error("invalid messaging configuration: {0}")]
    Config(String),
}

impl From<MessengerError> for ApiError {
    fn from(err: MessengerError) -> Self {
        warn!("Messaging failure: {}", err);
        ApiError::dependency_error("Messaging provider unavailable")
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryStatus, MessengerError>;
}

/// Writes messages to the log and reports them delivered.
#[derive(Debug, Default)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryStatus, MessengerError> {
        info!(
            "Outbound {:?} message to {}: {}",
            message.channel, message.recipient, message.content
        );
        Ok(DeliveryStatus::Delivered)
    }
}

#[derive(Debug, Deserialize)]
struct ProviderReply {
    status: DeliveryStatus,
}

/// POSTs the message as JSON and expects `{"status": "delivered" | "failed"}`.
pub struct WebhookMessenger {
    client: reqwest::Client,
    url: String,
}

impl WebhookMessenger {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, MessengerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MessengerError::Config(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl Messenger for WebhookMessenger {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryStatus, MessengerError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| MessengerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MessengerError::Rejected(format!("HTTP {}", status)));
        }

        let reply: ProviderReply = response
            .json()
            .await
            .map_err(|e| MessengerError::Rejected(format!("unreadable reply: {}", e)))?;
        Ok(reply.status)
    }
}

/// Picks the webhook provider when a URL is configured, the log otherwise.
pub fn from_config(config: &MessagingConfig) -> Result<Box<dyn Messenger>, MessengerError> {
    match &config.webhook_url {
        Some(url) => {
            info!("Messaging via webhook {}", url);
            Ok(Box::new(WebhookMessenger::new(
                url.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        None => Ok(Box::new(LogMessenger)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> OutboundMessage {
        OutboundMessage {
            channel: Channel::Whatsapp,
            recipient: "+15550100".into(),
            content: "hello".into(),
        }
    }

    #[tokio::test]
    async fn log_messenger_always_delivers() {
        assert_eq!(LogMessenger.send(&message()).await.unwrap(), DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn unreachable_webhook_is_a_transport_error() {
        let port = portpicker::pick_unused_port().expect("free port");
        let messenger =
            WebhookMessenger::new(format!("http://127.0.0.1:{}/send", port), Duration::from_secs(2)).unwrap();

        let err = messenger.send(&message()).await.unwrap_err();
        assert!(matches!(err, MessengerError::Transport(_)));
        assert_eq!(ApiError::from(err).status_code(), 502);
    }

    #[test]
    fn message_wire_shape() {
        let value = serde_json::to_value(message()).unwrap();
        assert_eq!(value["channel"], "whatsapp");
        assert_eq!(value["recipient"], "+15550100");
    }
}
