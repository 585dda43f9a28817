//! Formatter trait: maps an item and a recipient's format to a message.

use crate::error::Result;
use crate::types::{Item, Message, NotificationFormat};

pub trait Formatter: Send + Sync {
    /// `notice` is the short source label shown alongside the item.
    fn format(&self, item: &Item, format: NotificationFormat, notice: &str) -> Result<Message>;
}
