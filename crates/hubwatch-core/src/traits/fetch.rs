//! Fetch trait: reads one page of a feed from the upstream API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{FeedKind, Item};

/// Rate-limit bucket used when a request carries no explicit classification.
pub const DEFAULT_RESOURCE_CLASS: &str = "core";

/// Parameters of a single paginated read.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub kind: FeedKind,
    /// `owner/repo`.
    pub resource_key: String,
    pub page_size: u32,
    /// Best-effort server-side filter. Results are re-filtered by the caller.
    pub since: Option<DateTime<Utc>>,
    /// Rate-limit bucket the request counts against.
    pub resource_class: String,
}

impl FetchRequest {
    pub fn new(kind: FeedKind, resource_key: &str, page_size: u32) -> Self {
        Self {
            kind,
            resource_key: resource_key.to_string(),
            page_size,
            since: None,
            resource_class: DEFAULT_RESOURCE_CLASS.to_string(),
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn resource_class(mut self, class: &str) -> Self {
        self.resource_class = class.to_string();
        self
    }
}

/// Reads feed items. Implementations must gate every HTTP call through the rate gate.
///
/// Items are returned in server order, which callers must not rely on.
/// Entries that fail to parse are skipped rather than failing the page.
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Item>>;
}
