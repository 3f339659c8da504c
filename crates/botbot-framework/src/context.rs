//! The per-invocation plugin context.
//!
//! A [`PluginContext`] is built fresh for every matched handler call and
//! scoped to one (plugin, channel, chatbot) triple. Nothing on it outlives the
//! invocation, so plugins cannot leak state between channels through it.

use std::collections::BTreeSet;
use std::sync::Arc;

use botbot_core::{
    Channel, ChatBot, KvBackend, LogEntry, LogStore, PluginSettings, QueueResult, StoreResult,
};
use serde_json::Value;

use crate::error::StorageResult;
use crate::kv::{KeyNamespace, PluginStorage};
use crate::metadata::{BotIdentity, Envelope};
use crate::registry::PluginRegistry;
use crate::resolver::ActiveConfigResolver;
use crate::responder::Responder;

/// Collaborators shared by every invocation of one router.
pub(crate) struct Services {
    pub registry: Arc<PluginRegistry>,
    pub resolver: Arc<ActiveConfigResolver>,
    pub kv: Arc<dyn KvBackend>,
    pub logs: Arc<dyn LogStore>,
    pub responder: Responder,
}

/// Replaces the template placeholders used in plugin docs.
pub fn render_docs(docs: &str, nick: &str, channel: &str) -> String {
    docs.replace("{{ nick }}", nick)
        .replace("{{nick}}", nick)
        .replace("{{ channel.name }}", channel)
}

/// What a handler sees of the world while it runs.
#[derive(Clone)]
pub struct PluginContext {
    slug: Arc<str>,
    bot: Arc<BotIdentity>,
    channel: Option<Arc<Channel>>,
    target: String,
    config: Arc<PluginSettings>,
    active: Arc<BTreeSet<String>>,
    storage: PluginStorage,
    services: Arc<Services>,
}

impl PluginContext {
    /// Builds the context for `slug` handling the line in `envelope`.
    ///
    /// The configuration snapshot is the plugin's declared defaults overlaid
    /// with the channel's stored configuration.
    pub(crate) async fn resolve(
        services: &Arc<Services>,
        slug: &str,
        envelope: &Envelope,
        active: Arc<BTreeSet<String>>,
    ) -> StoreResult<Self> {
        let line = &envelope.line;
        let channel = line.channel().cloned();

        let mut config = services
            .registry
            .plugin(slug)
            .map(|info| info.defaults.clone())
            .unwrap_or_default();
        if let Some(channel) = &channel {
            let stored = services.resolver.plugin_config(channel.id, slug).await?;
            config.extend(stored.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let namespace = match &channel {
            Some(channel) => KeyNamespace::new(line.chatbot_id(), channel.id, slug),
            None => KeyNamespace::new(line.chatbot_id(), line.channel_name(), slug),
        };

        Ok(Self {
            slug: Arc::from(slug),
            bot: Arc::clone(&envelope.bot),
            channel,
            target: line.channel_name().to_string(),
            config: Arc::new(config),
            active,
            storage: PluginStorage::new(Arc::clone(&services.kv), namespace),
            services: Arc::clone(services),
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn chatbot(&self) -> &ChatBot {
        &self.bot.chatbot
    }

    /// The resolved channel; `None` for private queries.
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_deref()
    }

    /// Where plain replies go: the channel name, or the sender of a query.
    pub fn target(&self) -> &str {
        &self.target
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn config(&self) -> &PluginSettings {
        &self.config
    }

    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config_value(key).and_then(Value::as_str)
    }

    /// Slugs of every plugin active in the channel.
    pub fn active_plugins(&self) -> &BTreeSet<String> {
        &self.active
    }

    /// User docs of a registered plugin with placeholders filled in.
    pub fn plugin_docs(&self, slug: &str) -> Option<String> {
        let info = self.services.registry.plugin(slug)?;
        let channel = self.channel().map_or(self.target.as_str(), |c| c.name.as_str());
        Some(render_docs(&info.docs, &self.bot.chatbot.nick, channel))
    }

    // ------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------

    pub fn storage(&self) -> &PluginStorage {
        &self.storage
    }

    pub async fn store(&self, key: &str, value: &str) -> StorageResult<()> {
        self.storage.store(key, value).await
    }

    pub async fn retrieve(&self, key: &str) -> StorageResult<Option<String>> {
        self.storage.retrieve(key).await
    }

    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.storage.delete(key).await
    }

    /// Persists one channel log entry.
    pub async fn log(&self, entry: LogEntry) -> StoreResult<()> {
        self.services.logs.create_log_entry(entry).await
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Sends `text` to the reply target outside the handler's return value.
    pub async fn respond(&self, text: &str) -> QueueResult<usize> {
        self.respond_to(&self.target, text).await
    }

    pub async fn respond_to(&self, target: &str, text: &str) -> QueueResult<usize> {
        self.services
            .responder
            .respond(self.bot.chatbot.id, target, text)
            .await
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("slug", &self.slug)
            .field("chatbot", &self.bot.chatbot.id)
            .field("target", &self.target)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
