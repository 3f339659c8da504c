//! Runtime error types.

use botbot_core::QueueError;
use botbot_framework::RegistryError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the runner or keep it from starting.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The inbound transport failed for a reason other than closing.
    #[error("Inbound queue failed: {0}")]
    Queue(#[from] QueueError),

    /// A redis backend could not be reached at startup.
    #[cfg(feature = "redis-backend")]
    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: redis::RedisError,
    },

    /// A signal handler could not be installed.
    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
