//! Error types for the BotBot framework.

use botbot_core::{LineError, StoreError};
use thiserror::Error;

/// Errors raised while building the plugin registry at start-up.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A route pattern is not a valid regular expression.
    #[error("plugin '{slug}' handler '{handler}' has an invalid pattern: {source}")]
    InvalidPattern {
        slug: String,
        handler: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that abort the processing of one inbound event.
///
/// Everything else is contained inside a single handler invocation.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Line(#[from] LineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced by the plugin key-value adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored value could not be (de)serialized.
    #[error("stored value for '{key}' is not valid JSON: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for key-value operations.
pub type StorageResult<T> = Result<T, StorageError>;
