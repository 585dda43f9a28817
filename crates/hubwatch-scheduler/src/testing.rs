//! In-memory collaborators for scheduler tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::traits::{FetchClient, FetchRequest, Transport};
use hubwatch_core::types::{FeedKind, Item, Message, RecipientId};

use crate::store::PersistenceStore;
use crate::tasks::RegistryState;

/// Store that keeps the last saved state in memory and counts writes.
pub struct MemoryStore {
    state: Mutex<RegistryState>,
    saves: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::new()),
            saves: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn saved(&self) -> RegistryState {
        self.state.lock().unwrap().clone()
    }
}

impl PersistenceStore for MemoryStore {
    fn load(&self) -> Result<RegistryState> {
        Ok(self.state.lock().unwrap().clone())
    }

    fn save(&self, state: &RegistryState) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HubWatchError::Persistence("disk full".into()));
        }
        *self.state.lock().unwrap() = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn item(kind: FeedKind, id: &str, updated_at: DateTime<Utc>) -> Item {
    Item {
        kind,
        id: id.to_string(),
        title: format!("Item {id}"),
        url: format!("https://github.com/a/b/issues/{id}"),
        author: "octocat".into(),
        author_avatar: None,
        state: Some("open".into()),
        labels: Vec::new(),
        body: None,
        created_at: updated_at,
        updated_at,
    }
}

/// Fetch client that replays scripted pages and records requests.
pub struct FakeFetch {
    pages: Mutex<VecDeque<Result<Vec<Item>>>>,
    /// Returned once the script is exhausted.
    fallback: Mutex<Vec<Item>>,
    pub requests: Mutex<Vec<FetchRequest>>,
    /// Simulated network latency per call.
    pub delay: Mutex<std::time::Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeFetch {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            delay: Mutex::new(std::time::Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn push_page(&self, items: Vec<Item>) {
        self.pages.lock().unwrap().push_back(Ok(items));
    }

    pub fn push_error(&self, err: HubWatchError) {
        self.pages.lock().unwrap().push_back(Err(err));
    }

    pub fn set_fallback(&self, items: Vec<Item>) {
        *self.fallback.lock().unwrap() = items;
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl FetchClient for FakeFetch {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Item>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.pages.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let mut items = match next {
            Some(page) => page?,
            None => self.fallback.lock().unwrap().clone(),
        };
        items.truncate(request.page_size as usize);
        Ok(items)
    }
}

/// Transport that records every delivery and can fail for chosen recipients.
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(RecipientId, Message)>>,
    failing: Mutex<HashSet<RecipientId>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail_for(&self, recipient: RecipientId) {
        self.failing.lock().unwrap().insert(recipient);
    }

    pub fn sent(&self) -> Vec<(RecipientId, Message)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<RecipientId> {
        self.sent.lock().unwrap().iter().map(|(r, _)| *r).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, recipient: RecipientId, message: &Message) -> Result<()> {
        if self.failing.lock().unwrap().contains(&recipient) {
            return Err(HubWatchError::Dispatch(format!("recipient {recipient} unreachable")));
        }
        self.sent.lock().unwrap().push((recipient, message.clone()));
        Ok(())
    }
}
