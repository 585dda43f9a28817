//! GitHub REST client: paginated feed reads gated by the [`RateGate`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hubwatch_core::config::GitHubConfig;
use hubwatch_core::error::{HubWatchError, Result};
use hubwatch_core::traits::{FetchClient, FetchRequest};
use hubwatch_core::types::{FeedKind, Item};
use reqwest::StatusCode;

use crate::entry;
use crate::rate_limit::RateGate;

/// Split `owner/repo` into its parts.
pub fn parse_repo(resource_key: &str) -> Result<(&str, &str)> {
    let valid = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    match resource_key.split_once('/') {
        Some((owner, repo)) if valid(owner) && valid(repo) => Ok((owner, repo)),
        _ => Err(HubWatchError::InvalidCommand(format!(
            "'{resource_key}' is not an owner/repo pair"
        ))),
    }
}

/// `filter` values of `GET /issues` accepted as `user-issues` resource keys.
pub const USER_ISSUE_FILTERS: [&str; 6] = ["assigned", "created", "mentioned", "subscribed", "repos", "all"];

/// Check that `resource_key` names something `kind` can poll.
pub fn validate_key(kind: FeedKind, resource_key: &str) -> Result<()> {
    match kind {
        FeedKind::UserIssues if USER_ISSUE_FILTERS.contains(&resource_key) => Ok(()),
        FeedKind::UserIssues => Err(HubWatchError::InvalidCommand(format!(
            "'{resource_key}' is not an issue filter (expected one of {})",
            USER_ISSUE_FILTERS.join(", ")
        ))),
        _ => parse_repo(resource_key).map(|_| ()),
    }
}

/// Endpoint path and query parameters for one feed page.
pub fn feed_query(request: &FetchRequest) -> Result<(String, Vec<(&'static str, String)>)> {
    validate_key(request.kind, &request.resource_key)?;
    let key = request.resource_key.as_str();
    let per_page = ("per_page", request.page_size.to_string());
    let listing = vec![
        ("state", "all".to_string()),
        ("sort", "updated".to_string()),
        ("direction", "desc".to_string()),
        per_page.clone(),
    ];

    let (path, mut query) = match request.kind {
        FeedKind::Issues => (format!("/repos/{key}/issues"), listing),
        // The pulls endpoint has no `since`; the scheduler filters client-side.
        FeedKind::Pulls => (format!("/repos/{key}/pulls"), listing),
        FeedKind::Releases => (format!("/repos/{key}/releases"), vec![per_page]),
        FeedKind::Commits => (format!("/repos/{key}/commits"), vec![per_page]),
        FeedKind::UserIssues => {
            let mut query = listing;
            query.push(("filter", key.to_string()));
            ("/issues".to_string(), query)
        }
    };
    if matches!(
        request.kind,
        FeedKind::Issues | FeedKind::Commits | FeedKind::UserIssues
    ) {
        query.extend(request.since.map(|s| ("since", s.to_rfc3339())));
    }
    Ok((path, query))
}

/// Map a non-success status to the error taxonomy.
fn status_error(status: StatusCode, quota_exhausted: bool, body: &str) -> HubWatchError {
    let detail = format!("GitHub API {status}: {}", body.chars().take(200).collect::<String>());
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && quota_exhausted)
    {
        HubWatchError::TransientFetch(detail)
    } else {
        HubWatchError::Http(detail)
    }
}

/// GitHub REST API client.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
    gate: Arc<RateGate>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, gate: Arc<RateGate>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HubWatchError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.resolved_token(),
            gate,
        })
    }

    /// GET one JSON array page, gated by the rate gate for `resource_class`.
    async fn get_page(
        &self,
        resource_class: &str,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<Vec<serde_json::Value>> {
        self.gate.before_request(resource_class).await;

        let mut req = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .header("Accept", "application/vnd.github+json")
            .query(query);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| HubWatchError::TransientFetch(format!("GET {path}: {e}")))?;

        let rate = self.gate.after_response(resource_class, resp.headers()).await;

        let status = resp.status();
        if !status.is_success() {
            let quota_exhausted = rate.is_some_and(|r| r.remaining == 0);
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, quota_exhausted, &body));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| HubWatchError::MalformedResponse(format!("GET {path}: {e}")))?;
        match body {
            serde_json::Value::Array(entries) => Ok(entries),
            other => Err(HubWatchError::MalformedResponse(format!(
                "GET {path}: expected array, got {}",
                type_name(&other)
            ))),
        }
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Parse a page, skipping entries that do not match the expected shape.
pub fn parse_page(kind: FeedKind, entries: Vec<serde_json::Value>) -> Vec<Item> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| match entry::parse_item(kind, value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("⚠️ Skipping malformed {} entry #{}: {}", kind, idx, e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl FetchClient for GitHubClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Item>> {
        let (path, query) = feed_query(request)?;
        let entries = self.get_page(&request.resource_class, &path, &query).await?;
        tracing::debug!("📥 {} {}: {} entries", request.kind, request.resource_key, entries.len());
        Ok(parse_page(request.kind, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_repo() {
        assert_eq!(parse_repo("rust-lang/rust").unwrap(), ("rust-lang", "rust"));
        assert_eq!(parse_repo("a_b/c.d").unwrap(), ("a_b", "c.d"));
        assert!(parse_repo("no-slash").is_err());
        assert!(parse_repo("a/b/c").is_err());
        assert!(parse_repo("/b").is_err());
    }

    #[test]
    fn test_issue_query_carries_since() {
        let since = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = FetchRequest::new(FeedKind::Issues, "a/b", 30).since(since);
        let (path, query) = feed_query(&request).unwrap();
        assert_eq!(path, "/repos/a/b/issues");
        assert!(query.contains(&("per_page", "30".to_string())));
        assert!(query.contains(&("since", "2024-01-01T00:00:00+00:00".to_string())));
    }

    #[test]
    fn test_pull_query_has_no_since() {
        let since = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = FetchRequest::new(FeedKind::Pulls, "a/b", 1).since(since);
        let (path, query) = feed_query(&request).unwrap();
        assert_eq!(path, "/repos/a/b/pulls");
        assert!(query.iter().all(|(k, _)| *k != "since"));
    }

    #[test]
    fn test_user_issue_query() {
        let since = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = FetchRequest::new(FeedKind::UserIssues, "assigned", 10).since(since);
        let (path, query) = feed_query(&request).unwrap();
        assert_eq!(path, "/issues");
        assert!(query.contains(&("filter", "assigned".to_string())));
        assert!(query.contains(&("since", "2024-01-01T00:00:00+00:00".to_string())));

        let request = FetchRequest::new(FeedKind::UserIssues, "a/b", 10);
        assert!(feed_query(&request).is_err());
    }

    #[test]
    fn test_validate_key_per_feed() {
        assert!(validate_key(FeedKind::Releases, "a/b").is_ok());
        assert!(validate_key(FeedKind::Releases, "mentioned").is_err());
        assert!(validate_key(FeedKind::UserIssues, "mentioned").is_ok());
        assert!(validate_key(FeedKind::UserIssues, "a/b").is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(status_error(StatusCode::BAD_GATEWAY, false, "").is_transient());
        assert!(status_error(StatusCode::FORBIDDEN, true, "").is_transient());
        assert!(!status_error(StatusCode::FORBIDDEN, false, "").is_transient());
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, false, "Not Found"),
            HubWatchError::Http(_)
        ));
    }

    #[test]
    fn test_parse_page_skips_malformed_entries() {
        let items = parse_page(
            FeedKind::Commits,
            vec![
                json!({"sha": 1}),
                json!({
                    "sha": "abc",
                    "html_url": "https://github.com/a/b/commit/abc",
                    "commit": {
                        "message": "init",
                        "author": {"name": "Ann", "date": "2024-01-01T00:00:00Z"},
                        "committer": {"name": "Ann", "date": "2024-01-01T00:00:00Z"}
                    }
                }),
            ],
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "abc");
    }
}
