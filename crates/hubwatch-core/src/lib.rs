//! # HubWatch Core
//!
//! Shared configuration, error taxonomy, data types and collaborator traits
//! used by the fetch client, transports and scheduler.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::HubWatchConfig;
pub use error::{HubWatchError, Result};
