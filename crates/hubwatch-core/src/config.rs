//! HubWatch configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{HubWatchError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HubWatchConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl HubWatchConfig {
    /// Load config from the default path (~/.hubwatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HubWatchError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HubWatchError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| HubWatchError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the HubWatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hubwatch")
    }
}

/// GitHub REST API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Personal access token. Falls back to `GITHUB_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_api_url() -> String { "https://api.github.com".into() }
fn default_user_agent() -> String { concat!("hubwatch/", env!("CARGO_PKG_VERSION")).into() }
fn default_timeout_secs() -> u64 { 30 }
fn default_page_size() -> u32 { 30 }

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

impl GitHubConfig {
    /// Configured token, else the `GITHUB_TOKEN` environment variable.
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()))
    }
}

/// Where a brand-new task starts reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorPolicy {
    /// Only items updated after the subscription was created.
    #[default]
    Now,
    /// Everything the first page returns.
    Backfill,
}

/// Persistence backend for subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

/// Poll scheduling and state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub store: StoreBackend,
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,
    #[serde(default)]
    pub initial_cursor: CursorPolicy,
}

fn default_data_dir() -> String { "~/.hubwatch/data".into() }
fn default_interval_ms() -> u64 { 600_000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store: StoreBackend::default(),
            default_interval_ms: default_interval_ms(),
            initial_cursor: CursorPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Data directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }
}

/// Which transport delivers notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Log notifications only (dry run).
    #[default]
    Log,
    Telegram,
    Discord,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    #[serde(default)]
    pub telegram: Option<TelegramTransportConfig>,
    #[serde(default)]
    pub discord: Option<DiscordTransportConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookTransportConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramTransportConfig {
    pub bot_token: String,
    #[serde(default = "default_telegram_api")]
    pub api_url: String,
}

fn default_telegram_api() -> String { "https://api.telegram.org".into() }

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscordTransportConfig {
    /// Recipient id (as a string key) → webhook URL.
    #[serde(default)]
    pub webhooks: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTransportConfig {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HubWatchConfig::parse("").unwrap();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.page_size, 30);
        assert_eq!(config.scheduler.default_interval_ms, 600_000);
        assert_eq!(config.scheduler.initial_cursor, CursorPolicy::Now);
        assert_eq!(config.scheduler.store, StoreBackend::Json);
        assert_eq!(config.transport.kind, TransportKind::Log);
    }

    #[test]
    fn test_parse_full_config() {
        let config = HubWatchConfig::parse(
            r#"
            [github]
            token = "ghp_x"
            page_size = 50

            [scheduler]
            data_dir = "/tmp/hubwatch"
            store = "sqlite"
            default_interval_ms = 60000
            initial_cursor = "backfill"

            [transport]
            kind = "discord"

            [transport.discord.webhooks]
            "123" = "https://discord.com/api/webhooks/1/abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.github.resolved_token().as_deref(), Some("ghp_x"));
        assert_eq!(config.github.page_size, 50);
        assert_eq!(config.scheduler.store, StoreBackend::Sqlite);
        assert_eq!(config.scheduler.initial_cursor, CursorPolicy::Backfill);
        assert_eq!(config.scheduler.data_path(), PathBuf::from("/tmp/hubwatch"));
        assert_eq!(config.transport.kind, TransportKind::Discord);
        let discord = config.transport.discord.unwrap();
        assert_eq!(discord.webhooks.get("123").map(String::as_str), Some("https://discord.com/api/webhooks/1/abc"));
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = HubWatchConfig::parse("[scheduler]\nstore = 42").unwrap_err();
        assert!(matches!(err, HubWatchError::Config(_)));
    }
}
