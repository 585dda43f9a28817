//! Discord transport: one incoming webhook per recipient, card bodies as embeds.

use async_trait::async_trait;
use hubwatch_core::config::DiscordTransportConfig;
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::traits::Transport;
use hubwatch_core::types::{Message, MessageBody, RecipientId};

/// Discord rejects message content over this many characters.
const MAX_CONTENT: usize = 2000;

pub struct DiscordTransport {
    config: DiscordTransportConfig,
    client: reqwest::Client,
}

impl DiscordTransport {
    pub fn new(config: DiscordTransportConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn webhook_for(&self, recipient: RecipientId) -> Result<&str> {
        self.config
            .webhooks
            .get(&recipient.to_string())
            .map(String::as_str)
            .ok_or_else(|| HubWatchError::Dispatch(format!("No Discord webhook for recipient {recipient}")))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Webhook payload for a message body.
pub fn render(message: &Message) -> serde_json::Value {
    match &message.body {
        MessageBody::Card {
            brief,
            title,
            url,
            summary,
            source,
            picture,
        } => {
            let mut embed = serde_json::json!({
                "title": truncate(title, 256),
                "url": url,
                "description": summary.join(" · "),
                "color": 0x00AAFF,
                "author": { "name": brief },
                "footer": {
                    "text": format!("{} • {}", source, message.created_at.format("%H:%M:%S UTC"))
                }
            });
            if let Some(picture) = picture {
                embed["thumbnail"] = serde_json::json!({ "url": picture });
            }
            serde_json::json!({ "embeds": [embed] })
        }
        _ => serde_json::json!({ "content": truncate(&message.to_plain_text(), MAX_CONTENT) }),
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, recipient: RecipientId, message: &Message) -> Result<()> {
        let url = self.webhook_for(recipient)?;
        let resp = self
            .client
            .post(url)
            .json(&render(message))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| HubWatchError::Dispatch(format!("Discord send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("✅ Discord notification sent to {}", recipient);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(HubWatchError::Dispatch(format!("Discord webhook error {status}: {body}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_becomes_embed() {
        let msg = Message::new(MessageBody::Card {
            brief: "repo-release".into(),
            title: "v1.0.0".into(),
            url: "https://github.com/a/b/releases/tag/v1.0.0".into(),
            summary: vec!["linux.tar.gz".into(), "v1.0.0".into()],
            source: "repo-release".into(),
            picture: Some("https://avatars/1".into()),
        });
        let payload = render(&msg);
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "v1.0.0");
        assert_eq!(embed["description"], "linux.tar.gz · v1.0.0");
        assert_eq!(embed["thumbnail"]["url"], "https://avatars/1");
    }

    #[test]
    fn test_long_text_is_truncated() {
        let msg = Message::new(MessageBody::Text("x".repeat(5000)));
        let payload = render(&msg);
        assert_eq!(payload["content"].as_str().unwrap().chars().count(), MAX_CONTENT);
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_dispatch_error() {
        let transport = DiscordTransport::new(DiscordTransportConfig::default());
        let err = transport
            .send(1, &Message::new(MessageBody::Text("hi".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, HubWatchError::Dispatch(_)));
    }
}
