//! Message formatting: turns a feed item into a text, card or JSON body.

use hubwatch_core::error::Result;
use hubwatch_core::traits::Formatter;
use hubwatch_core::types::{FeedKind, Item, Message, MessageBody, NotificationFormat};

/// Commit bodies are cut to this many characters in text messages.
const MAX_BODY_CHARS: usize = 1000;

/// Default formatter for all feeds.
pub struct MessageFormatter;

impl MessageFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

fn text(item: &Item, notice: &str) -> String {
    let mut lines = vec![
        format!("{notice} with {} by {}", item.kind.noun(), item.author),
        format!("URL: {}", item.url),
        format!("CREATED_AT: {}", item.created_at.to_rfc3339()),
    ];
    match item.kind {
        FeedKind::Issues | FeedKind::Pulls | FeedKind::UserIssues => {
            lines.push(format!("UPDATED_AT: {}", item.updated_at.to_rfc3339()));
            lines.push(format!("TITLE: {}", item.title));
            if let Some(state) = &item.state {
                lines.push(format!("STATE: {state}"));
            }
            if !item.labels.is_empty() {
                let names: Vec<&str> = item.labels.iter().map(|l| l.name.as_str()).collect();
                lines.push(format!("LABELS: {}", names.join(", ")));
            }
        }
        FeedKind::Releases => {
            lines.push(format!("UPDATED_AT: {}", item.updated_at.to_rfc3339()));
            lines.push(format!("NAME: {}", item.title));
            if let Some(body) = item.body.as_deref().filter(|b| !b.is_empty()) {
                lines.push(clip(body, MAX_BODY_CHARS));
            }
        }
        FeedKind::Commits => {
            lines.push(format!("SHA: {}", short_sha(&item.id)));
            lines.push(clip(item.body.as_deref().unwrap_or(&item.title), MAX_BODY_CHARS));
        }
    }
    lines.join("\n")
}

fn card(item: &Item, notice: &str) -> MessageBody {
    let title = match item.kind {
        FeedKind::Commits => format!("{} {}", short_sha(&item.id), item.title),
        FeedKind::Issues | FeedKind::Pulls | FeedKind::UserIssues => format!("#{} {}", item.id, item.title),
        FeedKind::Releases => item.title.clone(),
    };
    MessageBody::Card {
        brief: notice.to_string(),
        title,
        url: item.url.clone(),
        summary: item.labels.iter().map(|l| l.name.clone()).collect(),
        source: notice.to_string(),
        picture: item.author_avatar.clone(),
    }
}

fn structured(item: &Item, notice: &str) -> serde_json::Value {
    serde_json::json!({
        "prompt": format!("[share]{}", item.title),
        "desc": item.kind.noun(),
        "tag": "GitHub",
        "source": notice,
        "title": item.title,
        "id": item.id,
        "url": item.url,
        "author": item.author,
        "preview": item.author_avatar,
        "state": item.state,
        "labels": item.labels.iter().map(|l| &l.name).collect::<Vec<_>>(),
        "created_at": item.created_at.to_rfc3339(),
        "updated_at": item.updated_at.to_rfc3339(),
    })
}

impl Formatter for MessageFormatter {
    fn format(&self, item: &Item, format: NotificationFormat, notice: &str) -> Result<Message> {
        let body = match format {
            NotificationFormat::Text => MessageBody::Text(text(item, notice)),
            NotificationFormat::Card => card(item, notice),
            NotificationFormat::Json => MessageBody::Json(structured(item, notice)),
        };
        Ok(Message::new(body))
    }
}
