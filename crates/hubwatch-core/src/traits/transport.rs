//! Transport trait: delivers a rendered message to one recipient.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Message, RecipientId};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name (e.g., "telegram", "discord").
    fn name(&self) -> &str;

    async fn send(&self, recipient: RecipientId, message: &Message) -> Result<()>;
}
