//! SQLite-backed persistence for subscription tasks.
//! One database can hold every feed: rows are namespaced by feed name, and a
//! save replaces that feed's rows inside a single transaction.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::types::{FeedKind, NotificationFormat};

use crate::store::PersistenceStore;
use crate::tasks::{RegistryState, Subscriber, SubscriptionTask};

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> HubWatchError + '_ {
    move |e| HubWatchError::Persistence(format!("{context}: {e}"))
}

/// Shared SQLite connection for all feed stores.
pub struct SchedulerDb {
    conn: Mutex<rusqlite::Connection>,
}

impl SchedulerDb {
    /// Open or create the scheduler database.
    pub fn open(path: &Path) -> Result<Arc<Self>> {
        let conn = rusqlite::Connection::open(path).map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    /// In-memory database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Arc<Self>> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Arc<Self>> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(Arc::new(db))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS subscription_tasks (
                feed TEXT NOT NULL,
                resource_key TEXT NOT NULL,
                interval_ms INTEGER NOT NULL,
                last_seen TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (feed, resource_key)
            );

            CREATE TABLE IF NOT EXISTS subscribers (
                feed TEXT NOT NULL,
                resource_key TEXT NOT NULL,
                position INTEGER NOT NULL,
                recipient_id INTEGER NOT NULL,
                format TEXT NOT NULL,           -- 'text', 'card', 'json'
                PRIMARY KEY (feed, resource_key, recipient_id)
            );
            ",
        )
        .map_err(db_err("Migration"))
    }

    /// A [`PersistenceStore`] view of this database for one feed.
    pub fn store(self: &Arc<Self>, feed: FeedKind) -> SqliteTaskStore {
        SqliteTaskStore {
            db: self.clone(),
            feed,
        }
    }

    fn load_feed(&self, feed: FeedKind) -> Result<RegistryState> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = RegistryState::new();

        let mut stmt = conn
            .prepare(
                "SELECT resource_key, interval_ms, last_seen, created_at
                 FROM subscription_tasks WHERE feed = ?1",
            )
            .map_err(db_err("Load tasks"))?;
        let rows = stmt
            .query_map([feed.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err("Load tasks"))?;
        for row in rows {
            let (resource_key, interval_ms, last_seen, created_at) = row.map_err(db_err("Load tasks"))?;
            let interval_ms = u64::try_from(interval_ms).map_err(|_| {
                HubWatchError::Persistence(format!("Load tasks: negative interval for {resource_key}"))
            })?;
            state.insert(
                resource_key.clone(),
                SubscriptionTask {
                    resource_key,
                    subscribers: Vec::new(),
                    interval_ms,
                    last_seen: parse_time(&last_seen)?,
                    created_at: parse_time(&created_at)?,
                },
            );
        }

        let mut stmt = conn
            .prepare(
                "SELECT resource_key, recipient_id, format FROM subscribers
                 WHERE feed = ?1 ORDER BY resource_key, position",
            )
            .map_err(db_err("Load subscribers"))?;
        let rows = stmt
            .query_map([feed.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err("Load subscribers"))?;
        for row in rows {
            let (resource_key, recipient_id, format) = row.map_err(db_err("Load subscribers"))?;
            let format: NotificationFormat = format
                .parse()
                .map_err(|e| HubWatchError::Persistence(format!("Load subscribers: {e}")))?;
            if let Some(task) = state.get_mut(&resource_key) {
                task.subscribers.push(Subscriber { recipient_id, format });
            }
        }
        Ok(state)
    }

    fn save_feed(&self, feed: FeedKind, state: &RegistryState) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction().map_err(db_err("Begin"))?;
        tx.execute("DELETE FROM subscribers WHERE feed = ?1", [feed.as_str()])
            .map_err(db_err("Clear subscribers"))?;
        tx.execute("DELETE FROM subscription_tasks WHERE feed = ?1", [feed.as_str()])
            .map_err(db_err("Clear tasks"))?;
        for task in state.values() {
            let interval_ms = i64::try_from(task.interval_ms).map_err(|_| {
                HubWatchError::Persistence(format!(
                    "Save task: interval {}ms of {} is out of range",
                    task.interval_ms, task.resource_key
                ))
            })?;
            tx.execute(
                "INSERT INTO subscription_tasks (feed, resource_key, interval_ms, last_seen, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    feed.as_str(),
                    task.resource_key,
                    interval_ms,
                    task.last_seen.to_rfc3339(),
                    task.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Save task"))?;
            for (position, sub) in task.subscribers.iter().enumerate() {
                tx.execute(
                    "INSERT INTO subscribers (feed, resource_key, position, recipient_id, format)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        feed.as_str(),
                        task.resource_key,
                        position as i64,
                        sub.recipient_id,
                        sub.format.to_string(),
                    ],
                )
                .map_err(db_err("Save subscriber"))?;
            }
        }
        tx.commit().map_err(db_err("Commit"))?;
        tracing::debug!("💾 Saved {} {} tasks to SQLite", state.len(), feed);
        Ok(())
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| HubWatchError::Persistence(format!("Bad timestamp '{s}': {e}")))
}

/// One feed's slice of a [`SchedulerDb`].
pub struct SqliteTaskStore {
    db: Arc<SchedulerDb>,
    feed: FeedKind,
}

impl PersistenceStore for SqliteTaskStore {
    fn load(&self) -> Result<RegistryState> {
        self.db.load_feed(self.feed)
    }

    fn save(&self, state: &RegistryState) -> Result<()> {
        self.db.save_feed(self.feed, state)
    }
}
