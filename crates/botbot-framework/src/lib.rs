//! # BotBot Framework
//!
//! Plugin definitions, the plugin registry and the router that feeds inbound
//! IRC lines to plugin handlers.
//!
//! ## Flow
//!
//! ```text
//! payload ──▶ MetadataCache::envelope ──▶ Router::dispatch ──▶ handler task ──▶ Responder
//!                (Line + chatbot)          (active plugins,      (fresh           (WRITE ...)
//!                                           route matching)       PluginContext)
//! ```
//!
//! - **Plugins** are described by [`PluginDefinition`]s built from
//!   [`PluginFactory`] functions and collected into a [`PluginRegistry`].
//! - **Handlers** are async functions over an [`Invocation`], erased into
//!   tower services ([`BoxedHandler`]).
//! - **Caching**: [`MetadataCache`] holds chatbot and channel records;
//!   [`ActiveConfigResolver`] holds per-channel activation and configuration
//!   with explicit invalidation.
//! - **Built-ins**: the `help` and `logger` plugins live in [`builtin`].

pub mod builtin;
pub mod cache;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod kv;
pub mod metadata;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod responder;
pub mod route;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use builtin::BUILTIN_PLUGINS;
pub use cache::TtlCache;
pub use context::{PluginContext, render_docs};
pub use dispatcher::{
    Collaborators, Dispatched, Outcome, Router, RouterBuilder, RouterStats, StatsSnapshot,
};
pub use error::{
    DispatchError, DispatchResult, RegistryError, RegistryResult, StorageError, StorageResult,
};
pub use handler::{BoxedHandler, IntoHandler, IntoReply, Invocation, Reply};
pub use kv::{KeyNamespace, PluginStorage};
pub use metadata::{BotIdentity, Envelope, MetadataCache};
pub use plugin::{PluginDefinition, PluginFactory, RouteSpec};
pub use registry::{PluginInfo, PluginRegistry, Route};
pub use resolver::ActiveConfigResolver;
pub use responder::{Responder, write_command};
pub use route::{RouteArgs, RouteClass};

pub use tower::BoxError;
