//! Telegram transport: delivers notifications via the Bot API `sendMessage`.

use async_trait::async_trait;
use hubwatch_core::config::TelegramTransportConfig;
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::traits::Transport;
use hubwatch_core::types::{Message, MessageBody, RecipientId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramTransport {
    config: TelegramTransportConfig,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(config: TelegramTransportConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }
}

/// Escape Telegram MarkdownV1 special characters.
fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

/// `sendMessage` payload for a message body.
pub fn render(chat_id: RecipientId, message: &Message) -> serde_json::Value {
    match &message.body {
        MessageBody::Text(text) => serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        }),
        MessageBody::Card {
            brief,
            title,
            url,
            summary,
            source,
            ..
        } => {
            let mut text = format!("*{}*\n[{}]({})", escape_markdown(brief), escape_markdown(title), url);
            if !summary.is_empty() {
                let tags: Vec<String> = summary.iter().map(|s| escape_markdown(s)).collect();
                text.push_str(&format!("\n{}", tags.join(" · ")));
            }
            text.push_str(&format!("\n_{}_", escape_markdown(source)));
            serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
                "disable_web_page_preview": false,
            })
        }
        MessageBody::Json(value) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            serde_json::json!({
                "chat_id": chat_id,
                "text": format!("```\n{}\n```", pretty.replace('`', "'")),
                "parse_mode": "Markdown",
            })
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, recipient: RecipientId, message: &Message) -> Result<()> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&render(recipient, message))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| HubWatchError::Dispatch(format!("Telegram send failed: {e}")))?;

        let status = resp.status();
        let result: TelegramApiResponse = resp
            .json()
            .await
            .map_err(|e| HubWatchError::Dispatch(format!("Invalid Telegram response ({status}): {e}")))?;

        if !result.ok {
            return Err(HubWatchError::Dispatch(format!(
                "Telegram API error {status}: {}",
                result.description.unwrap_or_default()
            )));
        }
        tracing::debug!("✅ Telegram notification sent to {}", recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_card_escapes_markdown() {
        let msg = Message::new(MessageBody::Card {
            brief: "repo-issue".into(),
            title: "fix *all* the_things".into(),
            url: "https://github.com/a/b/issues/1".into(),
            summary: vec!["good first issue".into()],
            source: "repo-issue".into(),
            picture: None,
        });
        let payload = render(42, &msg);
        assert_eq!(payload["chat_id"], 42);
        assert_eq!(payload["parse_mode"], "Markdown");
        let text = payload["text"].as_str().unwrap();
        assert!(text.contains("fix \\*all\\* the\\_things"));
        assert!(text.contains("(https://github.com/a/b/issues/1)"));
    }

    #[test]
    fn test_render_text_is_plain() {
        let payload = render(7, &Message::new(MessageBody::Text("hello *world*".into())));
        assert_eq!(payload["text"], "hello *world*");
        assert!(payload.get("parse_mode").is_none());
    }
}
