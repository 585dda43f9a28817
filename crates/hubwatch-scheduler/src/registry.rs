//! Task registry: the single source of truth for subscriptions.
//!
//! Every mutation is applied to a copy of the state, persisted, and only then
//! made visible. A failed save leaves the in-memory state exactly as it was.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use hubwatch_core::config::CursorPolicy;
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::types::{FeedKind, NotificationFormat, RecipientId};

use crate::store::PersistenceStore;
use crate::tasks::{RegistryState, SubscriptionTask, TaskSummary};

/// Largest interval the stores can represent (SQLite integers are signed).
pub const MAX_INTERVAL_MS: u64 = i64::MAX as u64;

/// Settings applied to newly created tasks.
#[derive(Debug, Clone, Copy)]
pub struct TaskDefaults {
    pub interval_ms: u64,
    pub initial_cursor: CursorPolicy,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            interval_ms: 600_000,
            initial_cursor: CursorPolicy::Now,
        }
    }
}

impl TaskDefaults {
    fn initial_cursor(&self) -> DateTime<Utc> {
        match self.initial_cursor {
            CursorPolicy::Now => Utc::now(),
            CursorPolicy::Backfill => DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Result of [`TaskRegistry::add`].
#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    pub task: SubscriptionTask,
    /// The task did not exist before this call.
    pub created: bool,
}

/// Result of [`TaskRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The recipient was not subscribed (or the task does not exist).
    Absent,
    /// Subscriber removed; others remain.
    Removed { remaining: usize },
    /// Last subscriber removed; the task was pruned.
    Pruned,
}

/// Subscriptions of one feed.
pub struct TaskRegistry {
    feed: FeedKind,
    tasks: Mutex<RegistryState>,
    store: Arc<dyn PersistenceStore>,
    defaults: TaskDefaults,
}

impl TaskRegistry {
    /// Load the registry from its store.
    pub fn open(feed: FeedKind, store: Arc<dyn PersistenceStore>, defaults: TaskDefaults) -> Result<Self> {
        let tasks = store.load()?;
        tracing::info!("📂 Loaded {} {} tasks", tasks.len(), feed);
        Ok(Self {
            feed,
            tasks: Mutex::new(tasks),
            store,
            defaults,
        })
    }

    pub fn feed(&self) -> FeedKind {
        self.feed
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to a copy of the state, persist it, then publish it.
    fn mutate<T>(&self, f: impl FnOnce(&mut RegistryState) -> Result<T>) -> Result<T> {
        let mut tasks = self.lock();
        let mut next = tasks.clone();
        let out = f(&mut next)?;
        if let Err(e) = self.store.save(&next) {
            tracing::warn!("⚠️ Failed to save {} tasks, change rolled back: {e}", self.feed);
            return Err(match e {
                HubWatchError::Persistence(_) => e,
                other => HubWatchError::Persistence(other.to_string()),
            });
        }
        *tasks = next;
        Ok(out)
    }

    /// Subscribe `recipient_id` to `resource_key`, creating the task if needed.
    /// Subscribing again only updates the recipient's format.
    pub fn add(
        &self,
        resource_key: &str,
        recipient_id: RecipientId,
        format: NotificationFormat,
    ) -> Result<AddOutcome> {
        let outcome = self.mutate(|tasks| {
            let created = !tasks.contains_key(resource_key);
            let task = tasks.entry(resource_key.to_string()).or_insert_with(|| {
                SubscriptionTask::new(
                    resource_key,
                    self.defaults.interval_ms.min(MAX_INTERVAL_MS),
                    self.defaults.initial_cursor(),
                )
            });
            task.upsert_subscriber(recipient_id, format);
            Ok(AddOutcome {
                task: task.clone(),
                created,
            })
        })?;
        tracing::info!(
            "📌 {} {}: recipient {} subscribed ({})",
            self.feed,
            resource_key,
            recipient_id,
            format
        );
        Ok(outcome)
    }

    /// Unsubscribe `recipient_id`. Removing the last subscriber prunes the task.
    pub fn remove(&self, resource_key: &str, recipient_id: RecipientId) -> Result<RemoveOutcome> {
        {
            let tasks = self.lock();
            let subscribed = tasks
                .get(resource_key)
                .is_some_and(|t| t.subscriber(recipient_id).is_some());
            if !subscribed {
                return Ok(RemoveOutcome::Absent);
            }
        }
        let outcome = self.mutate(|tasks| {
            let Some(task) = tasks.get_mut(resource_key) else {
                return Ok(RemoveOutcome::Absent);
            };
            if !task.remove_subscriber(recipient_id) {
                return Ok(RemoveOutcome::Absent);
            }
            if task.is_empty() {
                tasks.remove(resource_key);
                Ok(RemoveOutcome::Pruned)
            } else {
                Ok(RemoveOutcome::Removed {
                    remaining: task.subscribers.len(),
                })
            }
        })?;
        tracing::info!(
            "🗑️ {} {}: recipient {} unsubscribed ({:?})",
            self.feed,
            resource_key,
            recipient_id,
            outcome
        );
        Ok(outcome)
    }

    /// Change the poll interval. The cursor is untouched.
    pub fn set_interval(&self, resource_key: &str, millis: u64) -> Result<SubscriptionTask> {
        if millis == 0 {
            return Err(HubWatchError::InvalidCommand("interval must be positive".into()));
        }
        if millis > MAX_INTERVAL_MS {
            return Err(HubWatchError::InvalidCommand(format!(
                "interval must be at most {MAX_INTERVAL_MS}ms"
            )));
        }
        self.mutate(|tasks| {
            let task = tasks
                .get_mut(resource_key)
                .ok_or_else(|| HubWatchError::TaskNotFound(resource_key.to_string()))?;
            task.interval_ms = millis;
            Ok(task.clone())
        })
    }

    /// Change one subscriber's format.
    pub fn set_format(
        &self,
        resource_key: &str,
        recipient_id: RecipientId,
        format: NotificationFormat,
    ) -> Result<SubscriptionTask> {
        self.mutate(|tasks| {
            let task = tasks
                .get_mut(resource_key)
                .ok_or_else(|| HubWatchError::TaskNotFound(resource_key.to_string()))?;
            let sub = task
                .subscribers
                .iter_mut()
                .find(|s| s.recipient_id == recipient_id)
                .ok_or_else(|| HubWatchError::SubscriberNotFound {
                    resource_key: resource_key.to_string(),
                    recipient_id,
                })?;
            sub.format = format;
            Ok(task.clone())
        })
    }

    /// Move a task's cursor forward and persist it. `created_at` names the task
    /// instance the cursor was computed for. No-op (no write) when that task is
    /// gone, was re-created since, or `cursor` is not newer than the stored one.
    pub fn advance_cursor(
        &self,
        resource_key: &str,
        created_at: DateTime<Utc>,
        cursor: DateTime<Utc>,
    ) -> Result<bool> {
        let applies = |task: &SubscriptionTask| task.created_at == created_at && cursor > task.last_seen;
        if !self.lock().get(resource_key).is_some_and(applies) {
            return Ok(false);
        }
        self.mutate(|tasks| {
            Ok(tasks
                .get_mut(resource_key)
                .filter(|task| task.created_at == created_at)
                .is_some_and(|task| task.advance(cursor)))
        })
    }

    /// Snapshot of every task `recipient_id` subscribes to.
    pub fn list(&self, recipient_id: RecipientId) -> Vec<TaskSummary> {
        self.lock()
            .values()
            .filter_map(|task| {
                task.subscriber(recipient_id).map(|sub| TaskSummary {
                    resource_key: task.resource_key.clone(),
                    interval_ms: task.interval_ms,
                    format: sub.format,
                    last_seen: task.last_seen,
                })
            })
            .collect()
    }

    pub fn get(&self, resource_key: &str) -> Option<SubscriptionTask> {
        self.lock().get(resource_key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> RegistryState {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonTaskStore;
    use crate::testing::MemoryStore;

    fn registry(store: Arc<MemoryStore>) -> TaskRegistry {
        TaskRegistry::open(FeedKind::Issues, store, TaskDefaults::default()).unwrap()
    }

    #[test]
    fn test_add_twice_keeps_one_entry_with_latest_format() {
        let store = Arc::new(MemoryStore::new());
        let reg = registry(store.clone());

        let first = reg.add("a/b", 123, NotificationFormat::Text).unwrap();
        assert!(first.created);
        let second = reg.add("a/b", 123, NotificationFormat::Card).unwrap();
        assert!(!second.created);

        let task = reg.get("a/b").unwrap();
        assert_eq!(task.subscribers.len(), 1);
        assert_eq!(task.subscriber(123).unwrap().format, NotificationFormat::Card);
        assert_eq!(store.saves(), 2);
    }

    #[test]
    fn test_add_remove_sequence_matches_set_semantics() {
        let reg = registry(Arc::new(MemoryStore::new()));
        let ops: [(bool, RecipientId); 7] = [
            (true, 1),
            (true, 1),
            (false, 2),
            (true, 2),
            (false, 1),
            (false, 1),
            (true, 1),
        ];
        let mut expected = std::collections::BTreeSet::new();
        for (add, recipient) in ops {
            if add {
                reg.add("a/b", recipient, NotificationFormat::Text).unwrap();
                expected.insert(recipient);
            } else {
                reg.remove("a/b", recipient).unwrap();
                expected.remove(&recipient);
            }
            let actual: std::collections::BTreeSet<_> = reg
                .get("a/b")
                .map(|t| t.subscribers.iter().map(|s| s.recipient_id).collect())
                .unwrap_or_default();
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_remove_absent_is_noop_without_write() {
        let store = Arc::new(MemoryStore::new());
        let reg = registry(store.clone());
        assert_eq!(reg.remove("a/b", 1).unwrap(), RemoveOutcome::Absent);
        reg.add("a/b", 1, NotificationFormat::Text).unwrap();
        assert_eq!(reg.remove("a/b", 2).unwrap(), RemoveOutcome::Absent);
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn test_last_remove_prunes_task() {
        let reg = registry(Arc::new(MemoryStore::new()));
        reg.add("a/b", 1, NotificationFormat::Text).unwrap();
        reg.add("a/b", 2, NotificationFormat::Text).unwrap();
        assert_eq!(reg.remove("a/b", 1).unwrap(), RemoveOutcome::Removed { remaining: 1 });
        assert_eq!(reg.remove("a/b", 2).unwrap(), RemoveOutcome::Pruned);
        assert!(reg.get("a/b").is_none());
    }

    #[test]
    fn test_set_interval_and_format_errors() {
        let reg = registry(Arc::new(MemoryStore::new()));
        assert!(matches!(
            reg.set_interval("a/b", 1000),
            Err(HubWatchError::TaskNotFound(_))
        ));
        assert!(matches!(
            reg.set_format("a/b", 1, NotificationFormat::Json),
            Err(HubWatchError::TaskNotFound(_))
        ));

        reg.add("a/b", 1, NotificationFormat::Text).unwrap();
        assert!(matches!(
            reg.set_format("a/b", 2, NotificationFormat::Json),
            Err(HubWatchError::SubscriberNotFound { recipient_id: 2, .. })
        ));
        assert!(matches!(
            reg.set_interval("a/b", 0),
            Err(HubWatchError::InvalidCommand(_))
        ));
        assert!(matches!(
            reg.set_interval("a/b", u64::MAX),
            Err(HubWatchError::InvalidCommand(_))
        ));
        assert_eq!(reg.set_interval("a/b", MAX_INTERVAL_MS).unwrap().interval_ms, MAX_INTERVAL_MS);
    }

    #[test]
    fn test_set_interval_keeps_cursor() {
        let reg = registry(Arc::new(MemoryStore::new()));
        let created = reg.add("a/b", 1, NotificationFormat::Text).unwrap().task;
        let updated = reg.set_interval("a/b", 5_000).unwrap();
        assert_eq!(updated.interval_ms, 5_000);
        assert_eq!(updated.last_seen, created.last_seen);
    }

    #[test]
    fn test_persistence_failure_rolls_back() {
        let store = Arc::new(MemoryStore::new());
        let reg = registry(store.clone());
        reg.add("a/b", 1, NotificationFormat::Text).unwrap();
        let before = reg.snapshot();

        store.fail_saves(true);
        assert!(matches!(
            reg.add("a/b", 2, NotificationFormat::Text),
            Err(HubWatchError::Persistence(_))
        ));
        assert!(matches!(
            reg.set_format("a/b", 1, NotificationFormat::Json),
            Err(HubWatchError::Persistence(_))
        ));
        assert!(matches!(reg.remove("a/b", 1), Err(HubWatchError::Persistence(_))));
        assert_eq!(reg.snapshot(), before);

        store.fail_saves(false);
        reg.add("a/b", 2, NotificationFormat::Text).unwrap();
        assert_eq!(reg.get("a/b").unwrap().subscribers.len(), 2);
    }

    #[test]
    fn test_advance_cursor_is_monotonic_and_skips_noop_writes() {
        let store = Arc::new(MemoryStore::new());
        let reg = registry(store.clone());
        let task = reg.add("a/b", 1, NotificationFormat::Text).unwrap().task;
        let (t0, born) = (task.last_seen, task.created_at);
        let saves = store.saves();

        assert!(!reg.advance_cursor("a/b", born, t0).unwrap());
        assert!(!reg.advance_cursor("a/b", born, t0 - chrono::Duration::seconds(1)).unwrap());
        assert!(!reg.advance_cursor("missing/repo", born, t0).unwrap());
        assert_eq!(store.saves(), saves);

        assert!(reg.advance_cursor("a/b", born, t0 + chrono::Duration::seconds(1)).unwrap());
        assert_eq!(reg.get("a/b").unwrap().last_seen, t0 + chrono::Duration::seconds(1));
    }

    #[test]
    fn test_advance_cursor_ignores_recreated_task() {
        let store = Arc::new(MemoryStore::new());
        let reg = registry(store.clone());
        let stale = reg.add("a/b", 1, NotificationFormat::Text).unwrap().task;
        reg.remove("a/b", 1).unwrap();
        let fresh = reg.add("a/b", 1, NotificationFormat::Text).unwrap().task;
        assert_ne!(fresh.created_at, stale.created_at);
        let saves = store.saves();

        let later = fresh.last_seen + chrono::Duration::hours(1);
        assert!(!reg.advance_cursor("a/b", stale.created_at, later).unwrap());
        assert_eq!(reg.get("a/b").unwrap().last_seen, fresh.last_seen);
        assert_eq!(store.saves(), saves);

        assert!(reg.advance_cursor("a/b", fresh.created_at, later).unwrap());
    }

    #[test]
    fn test_backfill_policy_starts_at_epoch() {
        let reg = TaskRegistry::open(
            FeedKind::Commits,
            Arc::new(MemoryStore::new()),
            TaskDefaults {
                interval_ms: 1_000,
                initial_cursor: CursorPolicy::Backfill,
            },
        )
        .unwrap();
        let task = reg.add("a/b", 1, NotificationFormat::Text).unwrap().task;
        assert_eq!(task.last_seen, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(task.interval_ms, 1_000);
    }

    #[test]
    fn test_list_reports_recipient_tasks() {
        let reg = registry(Arc::new(MemoryStore::new()));
        reg.add("a/b", 1, NotificationFormat::Card).unwrap();
        reg.add("c/d", 1, NotificationFormat::Json).unwrap();
        reg.add("e/f", 2, NotificationFormat::Text).unwrap();

        let listed = reg.list(1);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].resource_key, "a/b");
        assert_eq!(listed[0].format, NotificationFormat::Card);
        assert_eq!(listed[1].format, NotificationFormat::Json);
        assert!(reg.list(3).is_empty());
    }

    #[test]
    fn test_reload_restores_state() {
        let dir = std::env::temp_dir().join(format!("hubwatch-registry-{}", uuid::Uuid::new_v4()));
        let store: Arc<dyn PersistenceStore> = Arc::new(JsonTaskStore::new(&dir, FeedKind::Pulls).unwrap());
        let reg = TaskRegistry::open(FeedKind::Pulls, store.clone(), TaskDefaults::default()).unwrap();
        reg.add("a/b", 1, NotificationFormat::Card).unwrap();
        reg.add("a/b", 2, NotificationFormat::Text).unwrap();
        reg.set_interval("a/b", 42_000).unwrap();
        let expected = reg.snapshot();
        drop(reg);

        let reloaded = TaskRegistry::open(FeedKind::Pulls, store, TaskDefaults::default()).unwrap();
        assert_eq!(reloaded.snapshot(), expected);
        std::fs::remove_dir_all(&dir).ok();
    }
}
