//! Plugins that ship with the runner.
//!
//! | Slug | Routes | Purpose |
//! |------|--------|---------|
//! | `help` | mention | Lists the channel's plugins and shows their docs |
//! | `logger` | firehose | Persists every channel line to the log store |

pub mod help;
pub mod logger;

use crate::plugin::PluginFactory;

/// Factories of the built-in plugins, registered before any other plugin.
pub const BUILTIN_PLUGINS: &[PluginFactory] = &[help::plugin, logger::plugin];
