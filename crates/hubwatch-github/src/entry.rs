//! Typed GitHub REST entries for the watched feeds, and their conversion to [`Item`].
//!
//! Only the fields a notification needs are modeled; serde ignores the rest.

use chrono::{DateTime, Utc};
use hubwatch_core::types::{FeedKind, Item, Label};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueLabel {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// `GET /repos/{owner}/{repo}/issues` and `/pulls` entries share this shape.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub user: User,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub name: Option<String>,
    pub tag_name: String,
    pub html_url: String,
    pub author: User,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl Release {
    /// Releases have no `updated_at`; asset uploads and publication move it.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.assets
            .iter()
            .map(|a| a.updated_at)
            .max()
            .or(self.published_at)
            .unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitActor {
    pub name: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: GitActor,
    pub committer: GitActor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub html_url: String,
    pub commit: CommitDetail,
    /// GitHub account of the author; absent when the email is unlinked.
    #[serde(default)]
    pub author: Option<User>,
}

fn labels(labels: Vec<IssueLabel>) -> Vec<Label> {
    labels
        .into_iter()
        .map(|l| Label {
            name: l.name,
            color: l.color,
        })
        .collect()
}

impl Issue {
    pub fn into_item(self, kind: FeedKind) -> Item {
        Item {
            kind,
            id: self.number.to_string(),
            title: self.title,
            url: self.html_url,
            author: self.user.login,
            author_avatar: self.user.avatar_url,
            state: Some(self.state),
            labels: labels(self.labels),
            body: self.body,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Release {
    pub fn into_item(self) -> Item {
        let updated_at = self.updated_at();
        let title = self
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.tag_name.clone());
        Item {
            kind: FeedKind::Releases,
            id: self.tag_name.clone(),
            title,
            url: self.html_url,
            author: self.author.login,
            author_avatar: self.author.avatar_url,
            state: None,
            labels: self
                .assets
                .into_iter()
                .map(|a| Label {
                    name: a.name,
                    color: None,
                })
                .chain(std::iter::once(Label {
                    name: self.tag_name,
                    color: None,
                }))
                .collect(),
            body: self.body,
            created_at: self.created_at,
            updated_at,
        }
    }
}

impl Commit {
    pub fn into_item(self) -> Item {
        let title = self
            .commit
            .message
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        let (author, author_avatar) = match self.author {
            Some(user) => (user.login, user.avatar_url),
            None => (self.commit.author.name.clone(), None),
        };
        Item {
            kind: FeedKind::Commits,
            id: self.sha,
            title,
            url: self.html_url,
            author,
            author_avatar,
            state: None,
            labels: Vec::new(),
            body: Some(self.commit.message),
            created_at: self.commit.author.date,
            updated_at: self.commit.committer.date,
        }
    }
}

/// Parse one raw JSON entry of a feed page.
pub fn parse_item(kind: FeedKind, value: serde_json::Value) -> serde_json::Result<Item> {
    Ok(match kind {
        FeedKind::Issues | FeedKind::Pulls | FeedKind::UserIssues => {
            serde_json::from_value::<Issue>(value)?.into_item(kind)
        }
        FeedKind::Releases => serde_json::from_value::<Release>(value)?.into_item(),
        FeedKind::Commits => serde_json::from_value::<Commit>(value)?.into_item(),
    })
}
