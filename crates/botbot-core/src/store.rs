//! Seams to the external collaborators.
//!
//! The runner does not own any persistent state. Channel metadata, plugin
//! activation, logs, plugin key-value data and both queues all live in
//! external systems reached through the traits below. Implementations must be
//! safe to call from many handler tasks at once.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{QueueResult, StoreResult};
use crate::model::{Channel, ChannelId, ChatBot, ChatBotId, LogEntry};

/// Opaque per-channel plugin configuration edited in the web admin.
pub type PluginSettings = Map<String, Value>;

/// Authoritative source of chatbot/channel metadata and plugin activation.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Looks up a chatbot by id.
    async fn chatbot(&self, id: ChatBotId) -> StoreResult<ChatBot>;

    /// Looks up a channel of `chatbot` by name; `None` if it is not logged.
    async fn channel_by_name(&self, chatbot: ChatBotId, name: &str)
    -> StoreResult<Option<Channel>>;

    /// Slugs of the plugins enabled for `channel`.
    async fn active_plugins(&self, channel: ChannelId) -> StoreResult<BTreeSet<String>>;

    /// Configuration of `slug` in `channel`; empty when the plugin is not
    /// active there.
    async fn plugin_config(&self, channel: ChannelId, slug: &str) -> StoreResult<PluginSettings>;
}

/// Persistence for channel logs.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn create_log_entry(&self, entry: LogEntry) -> StoreResult<()>;
}

/// Durable key-value backend for plugin state.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`, returning whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;
}

/// The queue the external bot process pushes packets onto.
#[async_trait]
pub trait InboundQueue: Send + Sync {
    /// Waits up to `timeout` for the next payload.
    ///
    /// Returns `Ok(None)` when the wait elapsed and
    /// [`QueueError::Closed`](crate::QueueError::Closed) once the queue will
    /// never yield again.
    async fn pop(&self, timeout: Duration) -> QueueResult<Option<String>>;

    /// Number of payloads waiting, when the transport can tell.
    async fn pending(&self) -> Option<usize> {
        None
    }
}

/// The queue the external bot process reads commands from.
#[async_trait]
pub trait OutboundQueue: Send + Sync {
    async fn push(&self, command: String) -> QueueResult<()>;
}
