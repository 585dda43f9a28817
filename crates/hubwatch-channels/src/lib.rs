//! # HubWatch Channels
//! Transports that deliver rendered notifications to recipients.

pub mod discord;
pub mod log;
pub mod telegram;
pub mod webhook;

use std::sync::Arc;

use hubwatch_core::config::{TransportConfig, TransportKind};
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::traits::Transport;

/// Build the configured transport.
pub fn transport_from_config(config: &TransportConfig) -> Result<Arc<dyn Transport>> {
    match config.kind {
        TransportKind::Log => Ok(Arc::new(log::LogTransport::new())),
        TransportKind::Telegram => {
            let tg = config.telegram.as_ref().ok_or_else(|| {
                HubWatchError::Config("transport.kind = telegram needs [transport.telegram]".into())
            })?;
            if tg.bot_token.is_empty() {
                return Err(HubWatchError::Config("telegram bot_token is empty".into()));
            }
            Ok(Arc::new(telegram::TelegramTransport::new(tg.clone())))
        }
        TransportKind::Discord => {
            let discord = config.discord.clone().unwrap_or_default();
            Ok(Arc::new(discord::DiscordTransport::new(discord)))
        }
        TransportKind::Webhook => {
            let wh = config.webhook.as_ref().ok_or_else(|| {
                HubWatchError::Config("transport.kind = webhook needs [transport.webhook]".into())
            })?;
            Ok(Arc::new(webhook::WebhookTransport::new(wh.clone())))
        }
    }
}
