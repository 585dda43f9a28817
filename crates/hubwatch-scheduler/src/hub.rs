//! Command surface: routes subscription commands to the scheduler of each feed
//! and keeps poll loops in step with subscriber sets.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hubwatch_core::config::{HubWatchConfig, StoreBackend};
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::traits::{FetchClient, Transport};
use hubwatch_core::types::{FeedKind, NotificationFormat, RecipientId};

use crate::dispatch::NotificationDispatcher;
use crate::engine::PollScheduler;
use crate::format::MessageFormatter;
use crate::persistence::SchedulerDb;
use crate::registry::{RemoveOutcome, TaskDefaults, TaskRegistry};
use crate::store::{JsonTaskStore, PersistenceStore};

const USAGE: &str = "usage: <issues|pulls|releases|commits|user-issues> \
add <key> <recipient> [format] | remove <key> <recipient> | \
interval <key> <millis> | format <key> <recipient> <format> | \
list <recipient> | test <key> <recipient> [format]\n\
<key> is owner/repo, or an issue filter (assigned, created, mentioned, subscribed, repos, all) for user-issues";

/// What a command asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Add {
        resource_key: String,
        recipient_id: RecipientId,
        format: NotificationFormat,
    },
    Remove {
        resource_key: String,
        recipient_id: RecipientId,
    },
    Interval {
        resource_key: String,
        millis: u64,
    },
    Format {
        resource_key: String,
        recipient_id: RecipientId,
        format: NotificationFormat,
    },
    List {
        recipient_id: RecipientId,
    },
    Test {
        resource_key: String,
        recipient_id: RecipientId,
        format: NotificationFormat,
    },
}

/// A command addressed to one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub feed: FeedKind,
    pub action: Action,
}

fn invalid(msg: impl std::fmt::Display) -> HubWatchError {
    HubWatchError::InvalidCommand(format!("{msg}\n{USAGE}"))
}

fn resource(feed: FeedKind, arg: Option<&str>) -> Result<String> {
    let key = arg.ok_or_else(|| invalid("missing <key>"))?;
    hubwatch_github::validate_key(feed, key)?;
    Ok(key.to_string())
}

fn recipient(arg: Option<&str>) -> Result<RecipientId> {
    let raw = arg.ok_or_else(|| invalid("missing <recipient>"))?;
    raw.parse()
        .map_err(|_| invalid(format!("recipient '{raw}' is not a number")))
}

fn format_or_default(arg: Option<&str>) -> Result<NotificationFormat> {
    arg.map(str::parse::<NotificationFormat>).transpose().map(Option::unwrap_or_default)
}

impl std::str::FromStr for Command {
    type Err = HubWatchError;

    fn from_str(line: &str) -> Result<Self> {
        let mut args = line.split_whitespace();
        let feed: FeedKind = args.next().ok_or_else(|| invalid("empty command"))?.parse()?;
        let verb = args.next().ok_or_else(|| invalid("missing action"))?;
        let action = match verb.to_lowercase().as_str() {
            "add" => Action::Add {
                resource_key: resource(feed, args.next())?,
                recipient_id: recipient(args.next())?,
                format: format_or_default(args.next())?,
            },
            "remove" | "rm" => Action::Remove {
                resource_key: resource(feed, args.next())?,
                recipient_id: recipient(args.next())?,
            },
            "interval" => {
                let resource_key = resource(feed, args.next())?;
                let raw = args.next().ok_or_else(|| invalid("missing <millis>"))?;
                let millis = raw
                    .parse()
                    .map_err(|_| invalid(format!("interval '{raw}' is not a number of milliseconds")))?;
                Action::Interval { resource_key, millis }
            }
            "format" => Action::Format {
                resource_key: resource(feed, args.next())?,
                recipient_id: recipient(args.next())?,
                format: args.next().ok_or_else(|| invalid("missing <format>"))?.parse()?,
            },
            "list" | "ls" => Action::List {
                recipient_id: recipient(args.next())?,
            },
            "test" => Action::Test {
                resource_key: resource(feed, args.next())?,
                recipient_id: recipient(args.next())?,
                format: format_or_default(args.next())?,
            },
            other => return Err(invalid(format!("unknown action '{other}'"))),
        };
        if let Some(extra) = args.next() {
            return Err(invalid(format!("unexpected argument '{extra}'")));
        }
        Ok(Command { feed, action })
    }
}

/// Owns one registry and scheduler per feed.
pub struct Hub {
    schedulers: BTreeMap<FeedKind, PollScheduler>,
    running: AtomicBool,
}

impl Hub {
    /// Build a hub whose registries are backed by `open_store`.
    pub fn build(
        defaults: TaskDefaults,
        page_size: u32,
        fetch: Arc<dyn FetchClient>,
        transport: Arc<dyn Transport>,
        mut open_store: impl FnMut(FeedKind) -> Result<Arc<dyn PersistenceStore>>,
    ) -> Result<Self> {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(MessageFormatter::new()),
            transport,
        ));
        let mut schedulers = BTreeMap::new();
        for feed in FeedKind::ALL {
            let registry = Arc::new(TaskRegistry::open(feed, open_store(feed)?, defaults)?);
            schedulers.insert(
                feed,
                PollScheduler::new(registry, fetch.clone(), dispatcher.clone(), page_size),
            );
        }
        Ok(Self {
            schedulers,
            running: AtomicBool::new(false),
        })
    }

    /// Build a hub with the store backend and defaults from `config`.
    pub fn from_config(
        config: &HubWatchConfig,
        fetch: Arc<dyn FetchClient>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let defaults = TaskDefaults {
            interval_ms: config.scheduler.default_interval_ms,
            initial_cursor: config.scheduler.initial_cursor,
        };
        let data_dir = config.scheduler.data_path();
        let page_size = config.github.page_size;
        match config.scheduler.store {
            StoreBackend::Json => Hub::build(defaults, page_size, fetch, transport, |feed| {
                Ok(Arc::new(JsonTaskStore::new(&data_dir, feed)?) as Arc<dyn PersistenceStore>)
            }),
            StoreBackend::Sqlite => {
                let db = open_db(&data_dir)?;
                Hub::build(defaults, page_size, fetch, transport, |feed| {
                    Ok(Arc::new(db.store(feed)) as Arc<dyn PersistenceStore>)
                })
            }
        }
    }

    pub fn scheduler(&self, feed: FeedKind) -> Result<&PollScheduler> {
        self.schedulers
            .get(&feed)
            .ok_or_else(|| HubWatchError::Config(format!("no scheduler for {feed}")))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the poll loops of every feed.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        for scheduler in self.schedulers.values() {
            scheduler.start();
        }
    }

    /// Stop every loop and wait for in-flight ticks.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for scheduler in self.schedulers.values() {
            scheduler.stop().await;
        }
    }

    /// Run one command and return the reply text.
    pub async fn execute(&self, command: Command) -> Result<String> {
        let feed = command.feed;
        let scheduler = self.scheduler(feed)?;
        let registry = scheduler.registry();
        match command.action {
            Action::Add {
                resource_key,
                recipient_id,
                format,
            } => {
                let outcome = registry.add(&resource_key, recipient_id, format)?;
                if self.is_running() {
                    scheduler.ensure_loop(&resource_key);
                }
                let task = if outcome.created { "new task" } else { "existing task" };
                Ok(format!(
                    "✅ {recipient_id} subscribed to {feed} of {resource_key} as {format} ({task}, every {}ms)",
                    outcome.task.interval_ms
                ))
            }
            Action::Remove {
                resource_key,
                recipient_id,
            } => match registry.remove(&resource_key, recipient_id)? {
                RemoveOutcome::Absent => Ok(format!(
                    "ℹ️ {recipient_id} is not subscribed to {feed} of {resource_key}"
                )),
                RemoveOutcome::Removed { remaining } => Ok(format!(
                    "🗑️ {recipient_id} unsubscribed from {feed} of {resource_key} ({remaining} left)"
                )),
                RemoveOutcome::Pruned => {
                    scheduler.stop_loop(&resource_key);
                    Ok(format!(
                        "🗑️ {recipient_id} unsubscribed from {feed} of {resource_key}; task removed"
                    ))
                }
            },
            Action::Interval {
                resource_key,
                millis,
            } => {
                registry.set_interval(&resource_key, millis)?;
                scheduler.reschedule(&resource_key);
                Ok(format!("⏱️ {feed} of {resource_key} now polled every {millis}ms"))
            }
            Action::Format {
                resource_key,
                recipient_id,
                format,
            } => {
                registry.set_format(&resource_key, recipient_id, format)?;
                Ok(format!(
                    "🎨 {recipient_id} now receives {feed} of {resource_key} as {format}"
                ))
            }
            Action::List { recipient_id } => {
                let tasks = registry.list(recipient_id);
                if tasks.is_empty() {
                    return Ok(format!("No {feed} subscriptions for {recipient_id}"));
                }
                let mut lines = vec![format!("📋 {} {feed} subscriptions for {recipient_id}:", tasks.len())];
                for task in tasks {
                    let state = if scheduler.is_running(&task.resource_key) {
                        "running"
                    } else {
                        "stopped"
                    };
                    lines.push(format!("  {task} ({state})"));
                }
                Ok(lines.join("\n"))
            }
            Action::Test {
                resource_key,
                recipient_id,
                format,
            } => {
                let item = scheduler.test(&resource_key, recipient_id, format).await?;
                Ok(format!(
                    "📨 Sent latest {} of {resource_key} ({}) to {recipient_id} as {format}",
                    feed.noun(),
                    item.id
                ))
            }
        }
    }
}

fn open_db(data_dir: &Path) -> Result<Arc<SchedulerDb>> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| HubWatchError::Persistence(format!("Create {}: {e}", data_dir.display())))?;
    SchedulerDb::open(&data_dir.join("hubwatch.db"))
}
