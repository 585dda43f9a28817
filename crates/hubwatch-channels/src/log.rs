//! Log transport: writes notifications to the tracing log instead of sending them.

use async_trait::async_trait;
use hubwatch_core::error::Result;
use hubwatch_core::traits::Transport;
use hubwatch_core::types::{Message, RecipientId};

pub struct LogTransport;

impl LogTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, recipient: RecipientId, message: &Message) -> Result<()> {
        tracing::info!("📣 [{}] {}", recipient, message.to_plain_text());
        Ok(())
    }
}
