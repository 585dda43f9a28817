//! Subscription task definitions: the persisted data model of the registry.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hubwatch_core::types::{NotificationFormat, RecipientId};
use serde::{Deserialize, Serialize};

/// One recipient of a task and the format they want.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub recipient_id: RecipientId,
    #[serde(default)]
    pub format: NotificationFormat,
}

/// A polling unit: one watched resource and everyone subscribed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionTask {
    /// `owner/repo`. Identity of the task.
    pub resource_key: String,
    /// Unique by `recipient_id`, in subscription order.
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
    pub interval_ms: u64,
    /// Most recent `updated_at` already delivered. Never moves backwards.
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Full registry state as persisted: resource key → task.
pub type RegistryState = BTreeMap<String, SubscriptionTask>;

impl SubscriptionTask {
    pub fn new(resource_key: &str, interval_ms: u64, last_seen: DateTime<Utc>) -> Self {
        Self {
            resource_key: resource_key.to_string(),
            subscribers: Vec::new(),
            interval_ms,
            last_seen,
            created_at: Utc::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn subscriber(&self, recipient_id: RecipientId) -> Option<&Subscriber> {
        self.subscribers.iter().find(|s| s.recipient_id == recipient_id)
    }

    /// Insert a subscriber, or update the format of an existing one.
    /// Returns true if the recipient was not subscribed before.
    pub fn upsert_subscriber(&mut self, recipient_id: RecipientId, format: NotificationFormat) -> bool {
        match self.subscribers.iter_mut().find(|s| s.recipient_id == recipient_id) {
            Some(existing) => {
                existing.format = format;
                false
            }
            None => {
                self.subscribers.push(Subscriber { recipient_id, format });
                true
            }
        }
    }

    /// Returns true if the recipient was subscribed.
    pub fn remove_subscriber(&mut self, recipient_id: RecipientId) -> bool {
        let len = self.subscribers.len();
        self.subscribers.retain(|s| s.recipient_id != recipient_id);
        self.subscribers.len() < len
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Move the cursor forward. Returns false if `cursor` is not newer.
    pub fn advance(&mut self, cursor: DateTime<Utc>) -> bool {
        if cursor > self.last_seen {
            self.last_seen = cursor;
            true
        } else {
            false
        }
    }
}

/// What `list` reports for one task a recipient subscribes to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub resource_key: String,
    pub interval_ms: u64,
    pub format: NotificationFormat,
    pub last_seen: DateTime<Utc>,
}

impl std::fmt::Display for TaskSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} interval={}ms format={} last_seen={}",
            self.resource_key,
            self.interval_ms,
            self.format,
            self.last_seen.to_rfc3339()
        )
    }
}
