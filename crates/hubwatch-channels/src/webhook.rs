//! Generic HTTP webhook transport: POSTs a JSON envelope per notification.

use async_trait::async_trait;
use hubwatch_core::config::WebhookTransportConfig;
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::traits::Transport;
use hubwatch_core::types::{Message, RecipientId};

pub struct WebhookTransport {
    config: WebhookTransportConfig,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(config: WebhookTransportConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

/// JSON envelope sent to the webhook.
pub fn envelope(recipient: RecipientId, message: &Message) -> serde_json::Value {
    serde_json::json!({
        "recipient": recipient,
        "message": message.body,
        "text": message.to_plain_text(),
        "timestamp": message.created_at.to_rfc3339(),
    })
}

#[async_trait]
impl Transport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, recipient: RecipientId, message: &Message) -> Result<()> {
        let mut req = self
            .client
            .post(&self.config.url)
            .json(&envelope(recipient, message))
            .timeout(std::time::Duration::from_secs(10));

        for (key, value) in &self.config.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| HubWatchError::Dispatch(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("✅ Webhook notification sent to {} for {}", self.config.url, recipient);
            Ok(())
        } else {
            Err(HubWatchError::Dispatch(format!("Webhook error {}", resp.status())))
        }
    }
}
