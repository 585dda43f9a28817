//! # HubWatch GitHub
//!
//! GitHub REST access for HubWatch: the shared [`RateGate`], typed feed
//! entries, and [`GitHubClient`], the `FetchClient` the scheduler polls through.
//!
//! ```text
//! PollScheduler ─▶ GitHubClient::fetch
//!                    ├── RateGate::before_request   (sleep while class is exhausted)
//!                    ├── GET /repos/{owner}/{repo}/{feed}  or  GET /issues?filter=..
//!                    └── RateGate::after_response   (X-RateLimit-* headers)
//! ```

pub mod client;
pub mod entry;
pub mod rate_limit;

pub use client::{GitHubClient, USER_ISSUE_FILTERS, parse_repo, validate_key};
pub use rate_limit::{RateGate, RateStatus};
