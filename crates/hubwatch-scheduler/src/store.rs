//! File-based task store: lightweight persistence.
//! Each feed's registry is saved as one JSON file: human-readable, git-friendly.
//! Only written on registry mutations and cursor advances, never on idle ticks.

use std::path::{Path, PathBuf};

use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::types::FeedKind;

use crate::tasks::RegistryState;

/// Durable storage for one registry's full state.
pub trait PersistenceStore: Send + Sync {
    /// Load the last durably saved state. A store that was never written is empty.
    fn load(&self) -> Result<RegistryState>;

    /// Replace the stored state with `state`. Must be all-or-nothing.
    fn save(&self, state: &RegistryState) -> Result<()>;
}

/// JSON file store: `<dir>/<feed>.json`.
pub struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    /// Create a store for `feed` inside `dir`, creating the directory if needed.
    pub fn new(dir: &Path, feed: FeedKind) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| HubWatchError::Persistence(format!("Create {}: {e}", dir.display())))?;
        Ok(Self {
            path: dir.join(format!("{}.json", feed.as_str())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistenceStore for JsonTaskStore {
    fn load(&self) -> Result<RegistryState> {
        if !self.path.exists() {
            return Ok(RegistryState::new());
        }
        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| HubWatchError::Persistence(format!("Read {}: {e}", self.path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| HubWatchError::Persistence(format!("Parse {}: {e}", self.path.display())))
    }

    fn save(&self, state: &RegistryState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| HubWatchError::Persistence(format!("Serialize error: {e}")))?;
        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| HubWatchError::Persistence(format!("Write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| HubWatchError::Persistence(format!("Rename {}: {e}", self.path.display())))?;
        tracing::debug!("💾 Saved {} tasks to {}", state.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::SubscriptionTask;
    use chrono::Utc;
    use hubwatch_core::types::NotificationFormat;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = std::env::temp_dir().join(format!("hubwatch-store-{}", uuid::Uuid::new_v4()));
        let store = JsonTaskStore::new(&dir, FeedKind::Issues).unwrap();
        assert!(store.load().unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("hubwatch-store-{}", uuid::Uuid::new_v4()));
        let store = JsonTaskStore::new(&dir, FeedKind::Releases).unwrap();

        let mut task = SubscriptionTask::new("a/b", 60_000, Utc::now());
        task.upsert_subscriber(123, NotificationFormat::Card);
        let mut state = RegistryState::new();
        state.insert(task.resource_key.clone(), task);

        store.save(&state).unwrap();
        assert_eq!(store.path().file_name().unwrap(), "releases.json");

        let reopened = JsonTaskStore::new(&dir, FeedKind::Releases).unwrap();
        assert_eq!(reopened.load().unwrap(), state);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let dir = std::env::temp_dir().join(format!("hubwatch-store-{}", uuid::Uuid::new_v4()));
        let store = JsonTaskStore::new(&dir, FeedKind::Issues).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.load(), Err(HubWatchError::Persistence(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}
