//! # BotBot Plugins
//!
//! The plugin collection loaded next to the built-in `help` and `logger`
//! plugins.
//!
//! | Slug | Routes | Purpose |
//! |------|--------|---------|
//! | `ping` | mention | Liveness check |
//! | `brain` | mention | Remembers, recalls and forgets short facts |
//! | `last_seen` | firehose, mention | Tells when a nick was last active |

pub mod brain;
pub mod last_seen;
pub mod ping;

use botbot_framework::PluginFactory;

/// Every plugin in this crate.
pub const PLUGINS: &[PluginFactory] = &[ping::plugin, brain::plugin, last_seen::plugin];
