//! Rate gate: per-resource-class quota tracking for the GitHub API.
//!
//! Every request asks the gate first (`before_request`) and every response
//! reports back (`after_response`). State for all classes sits behind one
//! mutex that is only held for reads and writes: a class that is out of quota
//! sleeps outside the lock, so unrelated classes are never held up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Quota snapshot for one resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Unix epoch seconds at which `remaining` resets.
    pub reset: i64,
}

impl RateStatus {
    /// Optimistic status for a class with no observed response yet.
    pub fn unseen(now: i64) -> Self {
        Self {
            limit: 1,
            remaining: 1,
            reset: now,
        }
    }

    /// Parse the three `X-RateLimit-*` headers. Missing or malformed → None.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        }
        Some(Self {
            limit: header(headers, LIMIT_HEADER)?,
            remaining: header(headers, REMAINING_HEADER)?,
            reset: header(headers, RESET_HEADER)?,
        })
    }

    /// Seconds to wait before a request may be issued. Zero when quota is left
    /// or the reset time has passed (clock skew clamps to zero).
    pub fn wait_secs(&self, now: i64) -> u64 {
        if self.remaining > 0 {
            return 0;
        }
        self.reset.saturating_sub(now).max(0) as u64
    }
}

/// Callback invoked with every status update: `(status, resource_class)`.
pub type RateNotice = Arc<dyn Fn(&RateStatus, &str) + Send + Sync>;

/// Source of "now" in Unix epoch seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp())
}

/// Shared quota gate for all polling tasks.
pub struct RateGate {
    rates: Mutex<HashMap<String, RateStatus>>,
    notice: Option<RateNotice>,
    clock: Clock,
}

impl RateGate {
    pub fn new() -> Self {
        Self {
            rates: Mutex::new(HashMap::new()),
            notice: None,
            clock: system_clock(),
        }
    }

    /// Set the status-update callback.
    pub fn with_notice<F>(mut self, f: F) -> Self
    where
        F: Fn(&RateStatus, &str) + Send + Sync + 'static,
    {
        self.notice = Some(Arc::new(f));
        self
    }

    /// Replace the wall clock (used by tests with paused tokio time).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Current status of a class, or the optimistic default if never seen.
    pub async fn status(&self, resource_class: &str) -> RateStatus {
        let rates = self.rates.lock().await;
        rates
            .get(resource_class)
            .copied()
            .unwrap_or_else(|| RateStatus::unseen(self.now()))
    }

    /// Wait until a request against `resource_class` may be issued.
    /// Returns how long the caller was suspended.
    pub async fn before_request(&self, resource_class: &str) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let wait_secs = {
                let rates = self.rates.lock().await;
                match rates.get(resource_class) {
                    Some(status) => status.wait_secs(self.now()),
                    None => 0,
                }
            };
            if wait_secs == 0 {
                return waited;
            }
            tracing::debug!(
                "⏳ Rate limit exhausted for '{}', waiting {}s",
                resource_class,
                wait_secs
            );
            let wait = Duration::from_secs(wait_secs);
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }

    /// Record the quota headers of a response. Responses without all three
    /// headers (redirects, non-API hosts) leave the state untouched.
    pub async fn after_response(&self, resource_class: &str, headers: &HeaderMap) -> Option<RateStatus> {
        let status = RateStatus::from_headers(headers)?;
        self.update(resource_class, status).await;
        Some(status)
    }

    /// Overwrite the status of a class and notify the callback.
    pub async fn update(&self, resource_class: &str, status: RateStatus) {
        let mut rates = self.rates.lock().await;
        rates.insert(resource_class.to_string(), status);
        if let Some(notice) = &self.notice {
            notice(&status, resource_class);
        }
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new()
    }
}
