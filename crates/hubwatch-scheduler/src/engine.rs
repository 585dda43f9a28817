//! Poll scheduler: one recurring loop per subscription task.
//!
//! A loop sleeps for the task's interval, then runs one tick: fetch a page,
//! keep the items newer than the cursor, fan them out, advance the cursor.
//! Ticks of one task are serialized by a per-key lock that outlives any single
//! loop, so a loop restarted while its predecessor is mid-tick waits its turn.
//! Stopping a loop only interrupts its sleep; a tick in flight always finishes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::traits::{FetchClient, FetchRequest};
use hubwatch_core::types::{FeedKind, Item, NotificationFormat, RecipientId};
use tokio::sync::{Mutex as AsyncMutex, Notify, watch};
use tokio::task::JoinHandle;

use crate::dispatch::{DispatchReport, NotificationDispatcher};
use crate::registry::TaskRegistry;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Items returned by the fetch.
    pub fetched: usize,
    /// Items newer than the cursor.
    pub fresh: usize,
    pub dispatch: DispatchReport,
    /// New cursor, if it moved.
    pub cursor: Option<DateTime<Utc>>,
}

struct PollContext {
    feed: FeedKind,
    registry: Arc<TaskRegistry>,
    fetch: Arc<dyn FetchClient>,
    dispatcher: Arc<NotificationDispatcher>,
    page_size: u32,
    resource_class: String,
    tick_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

struct LoopHandle {
    stop: watch::Sender<bool>,
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Drives every task of one feed.
pub struct PollScheduler {
    ctx: Arc<PollContext>,
    loops: Mutex<HashMap<String, LoopHandle>>,
    /// Loops signalled to stop that may still be finishing a tick.
    retired: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl PollScheduler {
    pub fn new(
        registry: Arc<TaskRegistry>,
        fetch: Arc<dyn FetchClient>,
        dispatcher: Arc<NotificationDispatcher>,
        page_size: u32,
    ) -> Self {
        Self {
            ctx: Arc::new(PollContext {
                feed: registry.feed(),
                registry,
                fetch,
                dispatcher,
                page_size: page_size.max(1),
                resource_class: hubwatch_core::traits::fetch::DEFAULT_RESOURCE_CLASS.to_string(),
                tick_locks: Mutex::new(HashMap::new()),
            }),
            loops: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
        }
    }

    pub fn feed(&self) -> FeedKind {
        self.ctx.feed
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.ctx.registry
    }

    fn loops(&self) -> MutexGuard<'_, HashMap<String, LoopHandle>> {
        self.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launch a loop for every task in the registry.
    pub fn start(&self) {
        let keys = self.ctx.registry.keys();
        tracing::info!("⏰ {} scheduler started ({} tasks)", self.ctx.feed, keys.len());
        for key in keys {
            self.ensure_loop(&key);
        }
    }

    /// Start the loop for `resource_key` unless one is already running.
    pub fn ensure_loop(&self, resource_key: &str) {
        let mut loops = self.loops();
        if loops.get(resource_key).is_some_and(|l| !l.handle.is_finished()) {
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(
            self.ctx.clone(),
            resource_key.to_string(),
            stop_rx,
            wake.clone(),
        ));
        loops.insert(resource_key.to_string(), LoopHandle { stop, wake, handle });
    }

    /// Make a running loop pick up a changed interval now instead of after its current sleep.
    pub fn reschedule(&self, resource_key: &str) {
        if let Some(l) = self.loops().get(resource_key) {
            l.wake.notify_one();
        }
    }

    fn retired(&self) -> MutexGuard<'_, Vec<(String, JoinHandle<()>)>> {
        self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signal the loop for `resource_key` to exit. Does not wait for it; a
    /// loop started for the same key later still waits for its tick to end.
    pub fn stop_loop(&self, resource_key: &str) -> bool {
        let Some(l) = self.loops().remove(resource_key) else {
            return false;
        };
        let _ = l.stop.send(true);
        let mut retired = self.retired();
        retired.retain(|(_, handle)| !handle.is_finished());
        retired.push((resource_key.to_string(), l.handle));
        true
    }

    /// Stop every loop and wait until in-flight ticks have finished.
    pub async fn stop(&self) {
        let running: Vec<(String, LoopHandle)> = self.loops().drain().collect();
        let mut handles: Vec<(String, JoinHandle<()>)> = self.retired().drain(..).collect();
        for (key, l) in running {
            let _ = l.stop.send(true);
            handles.push((key, l.handle));
        }
        for (key, handle) in handles {
            if let Err(e) = handle.await {
                tracing::warn!("⚠️ {} loop for {} ended abnormally: {e}", self.ctx.feed, key);
            }
        }
        tracing::info!("⏹️ {} scheduler stopped", self.ctx.feed);
    }

    pub fn is_running(&self, resource_key: &str) -> bool {
        self.loops()
            .get(resource_key)
            .is_some_and(|l| !l.handle.is_finished())
    }

    /// Run one poll cycle for `resource_key` now.
    pub async fn tick(&self, resource_key: &str) -> Result<TickReport> {
        self.ctx.tick(resource_key).await
    }

    /// Fetch the most recent item and send it to one recipient. The cursor is never read or written.
    pub async fn test(
        &self,
        resource_key: &str,
        recipient_id: RecipientId,
        format: NotificationFormat,
    ) -> Result<Item> {
        let request = FetchRequest::new(self.ctx.feed, resource_key, 1)
            .resource_class(&self.ctx.resource_class);
        let item = self
            .ctx
            .fetch
            .fetch(&request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                HubWatchError::MalformedResponse(format!(
                    "no {} found for {resource_key}",
                    self.ctx.feed.noun()
                ))
            })?;
        self.ctx
            .dispatcher
            .dispatch(&item, recipient_id, format, self.ctx.feed.notice())
            .await?;
        Ok(item)
    }
}

impl PollContext {
    fn tick_lock(&self, resource_key: &str) -> Arc<AsyncMutex<()>> {
        self.tick_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(resource_key.to_string())
            .or_default()
            .clone()
    }

    async fn tick(&self, resource_key: &str) -> Result<TickReport> {
        let lock = self.tick_lock(resource_key);
        let _guard = lock.lock().await;

        let task = self
            .registry
            .get(resource_key)
            .ok_or_else(|| HubWatchError::TaskNotFound(resource_key.to_string()))?;
        let cursor = task.last_seen;

        let request = FetchRequest::new(self.feed, resource_key, self.page_size)
            .since(cursor)
            .resource_class(&self.resource_class);
        let items = self.fetch.fetch(&request).await?;

        let mut report = TickReport {
            fetched: items.len(),
            ..Default::default()
        };
        // Server ordering is not trusted: keep fetch order, filter on each item's own timestamp.
        let fresh: Vec<&Item> = items.iter().filter(|i| i.updated_at > cursor).collect();
        report.fresh = fresh.len();
        if fresh.is_empty() {
            tracing::debug!("💤 {} {}: nothing new ({} fetched)", self.feed, resource_key, report.fetched);
            return Ok(report);
        }

        // Subscribers as of now, after the fetch. A task removed (or removed and
        // re-created) meanwhile gets nothing from this tick.
        let Some(subscribers) = self
            .registry
            .get(resource_key)
            .filter(|live| live.created_at == task.created_at)
            .map(|live| live.subscribers)
        else {
            tracing::debug!("💤 {} {}: task replaced during fetch, tick dropped", self.feed, resource_key);
            return Ok(report);
        };
        for item in &fresh {
            report.dispatch += self
                .dispatcher
                .fan_out(item, &subscribers, self.feed.notice())
                .await;
        }

        let newest = fresh.iter().map(|i| i.updated_at).fold(cursor, std::cmp::max);
        if self
            .registry
            .advance_cursor(resource_key, task.created_at, newest)?
        {
            report.cursor = Some(newest);
        }
        tracing::info!(
            "🔔 {} {}: {} new, {} delivered, {} failed",
            self.feed,
            resource_key,
            report.fresh,
            report.dispatch.delivered,
            report.dispatch.failed
        );
        Ok(report)
    }
}

async fn run_loop(
    ctx: Arc<PollContext>,
    resource_key: String,
    mut stop: watch::Receiver<bool>,
    wake: Arc<Notify>,
) {
    tracing::info!("🔁 {} loop started for {}", ctx.feed, resource_key);
    loop {
        let Some(task) = ctx.registry.get(&resource_key) else {
            break;
        };
        tokio::select! {
            _ = tokio::time::sleep(task.interval()) => {}
            _ = wake.notified() => continue,
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }
        if *stop.borrow() {
            break;
        }

        match ctx.tick(&resource_key).await {
            Ok(_) => {}
            Err(HubWatchError::TaskNotFound(_)) => break,
            Err(e) if e.is_transient() => {
                tracing::warn!("⚠️ {} {}: fetch failed, retrying next tick: {e}", ctx.feed, resource_key);
            }
            Err(e) => {
                tracing::warn!("⚠️ {} {}: tick failed: {e}", ctx.feed, resource_key);
            }
        }
    }
    tracing::info!("⏹️ {} loop stopped for {}", ctx.feed, resource_key);
}
