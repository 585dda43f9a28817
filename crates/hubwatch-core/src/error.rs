//! Error taxonomy shared by every HubWatch crate.

use thiserror::Error;

/// All failures surfaced by HubWatch components.
///
/// None of these are process-fatal: the scheduler retries on the next tick,
/// and command handlers report them back to whoever issued the command.
#[derive(Debug, Error)]
pub enum HubWatchError {
    #[error("Config error: {0}")]
    Config(String),

    /// Network failure or 5xx from the API. Retried on the next tick.
    #[error("Transient fetch failure: {0}")]
    TransientFetch(String),

    /// Non-retryable HTTP status (4xx other than rate limiting).
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Subscriber {recipient_id} not found for task {resource_key}")]
    SubscriberNotFound {
        resource_key: String,
        recipient_id: i64,
    },

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Dispatch failure: {0}")]
    Dispatch(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HubWatchError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, HubWatchError>;
