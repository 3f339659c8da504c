//! Runner configuration: schema, layered loading and validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BotbotConfig, ChannelConfig, ChatBotConfig, DispatchConfig, KvBackendKind, LogFormat, LogOutput,
    LoggingConfig, QueueBackend, QueueConfig, StorageConfig,
};
pub use validation::validate_config;
