//! BotBot Runtime - everything around the router needed to run it as a
//! process.
//!
//! - [`config`]: figment-based layered configuration and validation
//! - [`logging`]: tracing subscriber setup from `[logging]`
//! - [`store`]: config-backed metadata and the JSON-lines log file
//! - [`bus`]: inbound and outbound queues over stdin and stdout
//! - `redis_backend`: queues and plugin storage in redis (feature
//!   `redis-backend`)
//! - [`runner`]: the [`PluginRunner`] loop with signal handling
//!
//! ```ignore
//! use botbot_runtime::{ConfigLoader, PluginRunner, logging};
//!
//! let config = ConfigLoader::new().load()?;
//! logging::init_from_config(&config.logging)?;
//! PluginRunner::from_config(&config).await?.run().await?;
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;
#[cfg(feature = "redis-backend")]
pub mod redis_backend;
pub mod runner;
pub mod store;

pub use bus::{LineReaderQueue, LineWriterQueue, StdinQueue, StdoutQueue};
pub use config::{BotbotConfig, ConfigError, ConfigLoader, ConfigResult, Profile, validate_config};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
#[cfg(feature = "redis-backend")]
pub use redis_backend::{RedisKv, RedisQueue};
pub use runner::{PluginRunner, all_plugins, shutdown_signal};
pub use store::{ConfigStore, JsonlLogStore};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros for code running inside the runner.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
