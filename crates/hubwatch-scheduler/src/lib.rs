//! # HubWatch Scheduler
//!
//! Subscription registry, per-task poll loops and notification fan-out.
//!
//! ## Design Principles
//! - One registry per feed, persisted on every mutation (JSON file or SQLite)
//! - One tokio task per subscription; ticks of a task never overlap
//! - Client-side filtering on `updated_at`; the cursor only moves forward
//! - Delivery failures are isolated per recipient
//!
//! ## Architecture
//! ```text
//! Hub (command surface)
//!   ├── issues   → PollScheduler ─┐
//!   ├── pulls    → PollScheduler  ├── TaskRegistry ── PersistenceStore
//!   ├── releases → PollScheduler  │
//!   ├── commits  → PollScheduler  │
//!   └── user-issues → PollScheduler ─┘
//!                     │ tick: fetch (since cursor) → filter → fan-out → advance cursor
//!                     └── NotificationDispatcher → MessageFormatter → Transport
//! ```

pub mod dispatch;
pub mod engine;
pub mod format;
pub mod hub;
pub mod persistence;
pub mod registry;
pub mod store;
pub mod tasks;

#[cfg(test)]
mod testing;

pub use dispatch::{DispatchReport, NotificationDispatcher};
pub use engine::{PollScheduler, TickReport};
pub use format::MessageFormatter;
pub use hub::{Action, Command, Hub};
pub use persistence::SchedulerDb;
pub use registry::{AddOutcome, RemoveOutcome, TaskDefaults, TaskRegistry};
pub use store::{JsonTaskStore, PersistenceStore};
pub use tasks::{Subscriber, SubscriptionTask, TaskSummary};
