//! Shared types, config, and error definitions for the SiagaAI sync layer.

pub mod config;
pub mod error;
pub mod types;

pub use config::{LayerFilter, ResourceConfig, RetryConfig, SyncConfig};
pub use error::{Error, ErrorKind};
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
