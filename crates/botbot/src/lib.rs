//! # BotBot
//!
//! The plugin runner of BotBot, an IRC channel logger. A separate bot
//! process sits in the channels and pushes every line it sees onto a queue;
//! this runner pops those lines, routes them to the plugins active in the
//! channel and queues their replies for the bot to send.
//!
//! ```text
//! ┌──────────┐  JSON line  ┌──────────────┐  spawn  ┌──────────────────────────┐
//! │ bot (IRC)│────────────▶│ PluginRunner │────────▶│ handler (own task + ctx) │
//! │          │◀────────────│    Router    │────────▶│ handler ...              │
//! └──────────┘ WRITE c t x └──────────────┘         └──────────────────────────┘
//! ```
//!
//! - [`core`]: line envelope, metadata records, collaborator traits
//! - [`framework`]: plugin definitions, registry, router, built-ins
//! - [`plugins`]: the bundled plugin collection
//! - [`runtime`]: configuration, logging and the process loop
//!
//! ## Writing a plugin
//!
//! ```rust,ignore
//! use botbot::prelude::*;
//!
//! async fn shout(inv: Invocation) -> Result<String, BoxError> {
//!     Ok(inv.arg("text").unwrap_or_default().to_uppercase())
//! }
//!
//! pub fn plugin() -> PluginDefinition {
//!     PluginDefinition::new("shout")
//!         .docs("Shouts for you.\n\n    {{ nick }}: shout <text>")
//!         .on_mention("shout", r"shout (?P<text>.+)", shout)
//! }
//! ```

pub use botbot_core as core;
pub use botbot_framework as framework;
pub use botbot_plugins as plugins;
pub use botbot_runtime as runtime;

/// Commonly used types for writing and running plugins.
pub mod prelude {
    pub use botbot_core::{Channel, ChatBot, Command, Line, LogEntry, PluginSettings};
    pub use botbot_framework::{
        BoxError, Invocation, PluginContext, PluginDefinition, PluginFactory, Reply,
    };
    pub use botbot_runtime::{BotbotConfig, ConfigLoader, PluginRunner};
    pub use botbot_runtime::prelude::*;
}
