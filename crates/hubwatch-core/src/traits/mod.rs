//! Collaborator traits consumed by the scheduler core.

pub mod fetch;
pub mod formatter;
pub mod transport;

pub use fetch::{FetchClient, FetchRequest};
pub use formatter::Formatter;
pub use transport::Transport;
