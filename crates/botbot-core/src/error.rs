//! Unified error types for the BotBot core.
//!
//! Framework-level errors (registry, dispatch) are defined in
//! `botbot-framework`; configuration errors live in `botbot-runtime`.

use thiserror::Error;

use crate::model::ChatBotId;

// =============================================================================
// Line Errors
// =============================================================================

/// Errors raised while turning a queue payload into a [`Line`](crate::Line).
///
/// Any of these drops the whole event: the payload has already been popped
/// off the inbound queue and is not retried.
#[derive(Debug, Clone, Error)]
pub enum LineError {
    /// The `Received` timestamp could not be parsed.
    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),

    /// The payload is not a valid inbound packet.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// The chatbot nick could not be turned into an address pattern.
    #[error("invalid nick '{0}'")]
    InvalidNick(String),
}

impl From<serde_json::Error> for LineError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPacket(err.to_string())
    }
}

/// Result type for envelope operations.
pub type LineResult<T> = Result<T, LineError>;

// =============================================================================
// Store Errors
// =============================================================================

/// Errors reported by the external stores (metadata, logs, key-value).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// No chatbot is registered under the given id.
    #[error("chatbot {0} not found")]
    ChatBotNotFound(ChatBotId),
}

impl StoreError {
    /// Creates an [`StoreError::Unavailable`] from any displayable cause.
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        Self::Unavailable(reason.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Queue Errors
// =============================================================================

/// Errors reported by the inbound and outbound queues.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The queue has been closed and will not yield more items.
    #[error("queue closed")]
    Closed,

    /// The underlying transport failed.
    #[error("queue transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
