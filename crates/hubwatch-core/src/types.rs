//! Shared data types: feed kinds, observed items, notification formats and messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HubWatchError;

/// Recipient identifier (chat id, contact id, webhook key).
pub type RecipientId = i64;

/// Which feed a subscription watches. Repository feeds are keyed by
/// `owner/repo`; `UserIssues` is keyed by an issue filter of the token owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Issues,
    Pulls,
    Releases,
    Commits,
    /// Issues and pulls across every repository visible to the authenticated user.
    #[serde(rename = "user-issues")]
    UserIssues,
}

impl FeedKind {
    pub const ALL: [FeedKind; 5] = [
        FeedKind::Issues,
        FeedKind::Pulls,
        FeedKind::Releases,
        FeedKind::Commits,
        FeedKind::UserIssues,
    ];

    /// Lowercase name used for store files and command routing.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Issues => "issues",
            FeedKind::Pulls => "pulls",
            FeedKind::Releases => "releases",
            FeedKind::Commits => "commits",
            FeedKind::UserIssues => "user-issues",
        }
    }

    /// Notice text prefixed to every notification of this feed.
    pub fn notice(&self) -> &'static str {
        match self {
            FeedKind::Issues => "repo-issue",
            FeedKind::Pulls => "repo-pull",
            FeedKind::Releases => "repo-release",
            FeedKind::Commits => "repo-commit",
            FeedKind::UserIssues => "issues",
        }
    }

    /// Singular noun used in rendered messages.
    pub fn noun(&self) -> &'static str {
        match self {
            FeedKind::Issues => "issue",
            FeedKind::Pulls => "pull",
            FeedKind::Releases => "release",
            FeedKind::Commits => "commit",
            FeedKind::UserIssues => "issue",
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FeedKind {
    type Err = HubWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "issues" | "issue" | "repo-issue" => Ok(FeedKind::Issues),
            "pulls" | "pull" | "repo-pull" => Ok(FeedKind::Pulls),
            "releases" | "release" | "repo-release" => Ok(FeedKind::Releases),
            "commits" | "commit" | "repo-commit" => Ok(FeedKind::Commits),
            "user-issues" | "my-issues" | "mine" => Ok(FeedKind::UserIssues),
            other => Err(HubWatchError::InvalidCommand(format!(
                "unknown feed '{other}' (expected issues, pulls, releases, commits or user-issues)"
            ))),
        }
    }
}

/// How a recipient wants items rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFormat {
    #[default]
    Text,
    Card,
    Json,
}

impl std::fmt::Display for NotificationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationFormat::Text => write!(f, "text"),
            NotificationFormat::Card => write!(f, "card"),
            NotificationFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for NotificationFormat {
    type Err = HubWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(NotificationFormat::Text),
            "card" | "xml" | "rich" => Ok(NotificationFormat::Card),
            "json" | "struct" => Ok(NotificationFormat::Json),
            other => Err(HubWatchError::InvalidCommand(format!(
                "unknown format '{other}' (expected text, card or json)"
            ))),
        }
    }
}

/// A label attached to an issue or pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    /// Hex color without the leading '#'.
    #[serde(default)]
    pub color: Option<String>,
}

/// One observed entry of a feed, normalized across feed kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub kind: FeedKind,
    /// Issue/pull number, release tag or commit sha.
    pub id: String,
    pub title: String,
    pub url: String,
    /// Login (or git author name) of whoever produced the entry.
    pub author: String,
    #[serde(default)]
    pub author_avatar: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Timestamp the scheduler's cursor is compared against.
    pub updated_at: DateTime<Utc>,
}

/// Rendered payload of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Text(String),
    Card {
        brief: String,
        title: String,
        url: String,
        summary: Vec<String>,
        source: String,
        #[serde(default)]
        picture: Option<String>,
    },
    Json(serde_json::Value),
}

/// An outbound message ready for a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(body: MessageBody) -> Self {
        Self {
            body,
            created_at: Utc::now(),
        }
    }

    /// Plain-text rendering, used by transports that cannot show rich bodies.
    pub fn to_plain_text(&self) -> String {
        match &self.body {
            MessageBody::Text(text) => text.clone(),
            MessageBody::Card {
                brief,
                title,
                url,
                summary,
                ..
            } => {
                let mut out = format!("[{brief}] {title}\n{url}");
                if !summary.is_empty() {
                    out.push('\n');
                    out.push_str(&summary.join(", "));
                }
                out
            }
            MessageBody::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}
