//! Which plugins are active in a channel, and with what configuration.
//!
//! Both lookups are cached per channel. Invalidations arrive whenever
//! activation or configuration changes; an optional TTL bounds staleness if
//! one is lost. Concurrent misses for the same channel may both hit the
//! store, and each writes a complete value.
//!
//! Every invalidation bumps a generation counter before it removes entries.
//! A lookup only caches what it read if the generation is unchanged when it
//! takes the cache lock, so a value read before an invalidation is served
//! once but never cached past it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use botbot_core::{ChannelId, MetadataStore, PluginSettings, StoreResult};
use tracing::debug;

use crate::cache::TtlCache;

pub struct ActiveConfigResolver {
    store: Arc<dyn MetadataStore>,
    active: TtlCache<ChannelId, Arc<BTreeSet<String>>>,
    configs: TtlCache<(ChannelId, String), Arc<PluginSettings>>,
    generation: AtomicU64,
}

impl ActiveConfigResolver {
    pub fn new(store: Arc<dyn MetadataStore>, ttl: Option<Duration>) -> Self {
        Self {
            store,
            active: TtlCache::new(ttl),
            configs: TtlCache::new(ttl),
            generation: AtomicU64::new(0),
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Slugs of the plugins enabled in `channel`.
    pub async fn active_plugins(&self, channel: ChannelId) -> StoreResult<Arc<BTreeSet<String>>> {
        if let Some(active) = self.active.get(&channel) {
            return Ok(active);
        }

        let generation = self.generation();
        let active = Arc::new(self.store.active_plugins(channel).await?);
        if !self
            .active
            .insert_if(channel, Arc::clone(&active), || self.generation() == generation)
        {
            debug!(channel = %channel, "Invalidated during lookup, not caching plugins");
        }
        Ok(active)
    }

    /// Stored configuration of `slug` in `channel`.
    pub async fn plugin_config(
        &self,
        channel: ChannelId,
        slug: &str,
    ) -> StoreResult<Arc<PluginSettings>> {
        let key = (channel, slug.to_string());
        if let Some(config) = self.configs.get(&key) {
            return Ok(config);
        }

        let generation = self.generation();
        let config = Arc::new(self.store.plugin_config(channel, slug).await?);
        if !self
            .configs
            .insert_if(key, Arc::clone(&config), || self.generation() == generation)
        {
            debug!(channel = %channel, plugin = %slug, "Invalidated during lookup, not caching config");
        }
        Ok(config)
    }

    /// Forgets everything cached for `channel`.
    pub fn invalidate_channel(&self, channel: ChannelId) {
        debug!(channel = %channel, "Invalidating channel plugin cache");
        self.bump_generation();
        self.active.remove(&channel);
        self.configs.retain(|(id, _)| *id != channel);
    }

    /// Forgets the activation set of `channel` and the configuration of one
    /// plugin in it.
    pub fn invalidate_plugin(&self, channel: ChannelId, slug: &str) {
        debug!(channel = %channel, plugin = %slug, "Invalidating plugin config cache");
        self.bump_generation();
        self.active.remove(&channel);
        self.configs.remove(&(channel, slug.to_string()));
    }

    pub fn invalidate_all(&self) {
        self.bump_generation();
        self.active.clear();
        self.configs.clear();
    }
}

impl std::fmt::Debug for ActiveConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveConfigResolver")
            .field("active", &self.active)
            .field("configs", &self.configs)
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use botbot_core::{Channel, ChatBot, ChatBotId, MemoryStore, MetadataSnapshot};
    use serde_json::Value;
    use tokio::sync::Notify;

    fn settings(key: &str, value: &str) -> PluginSettings {
        let mut settings = PluginSettings::new();
        settings.insert(key.into(), Value::from(value));
        settings
    }

    fn store() -> Arc<MemoryStore> {
        let mut snapshot = MetadataSnapshot::new();
        snapshot.activate(ChannelId(1), "brain", settings("mode", "old"));
        Arc::new(MemoryStore::from_snapshot(snapshot))
    }

    #[tokio::test]
    async fn test_config_is_cached_until_invalidated() {
        let store = store();
        let resolver = ActiveConfigResolver::new(store.clone(), None);

        let first = resolver.plugin_config(ChannelId(1), "brain").await.unwrap();
        assert_eq!(first.get("mode"), Some(&Value::from("old")));

        store.update(|s| s.activate(ChannelId(1), "brain", settings("mode", "new")));
        let cached = resolver.plugin_config(ChannelId(1), "brain").await.unwrap();
        assert_eq!(cached.get("mode"), Some(&Value::from("old")));

        resolver.invalidate_plugin(ChannelId(1), "brain");
        let fresh = resolver.plugin_config(ChannelId(1), "brain").await.unwrap();
        assert_eq!(fresh.get("mode"), Some(&Value::from("new")));
    }

    #[tokio::test]
    async fn test_active_set_follows_channel_invalidation() {
        let store = store();
        let resolver = ActiveConfigResolver::new(store.clone(), None);
        assert_eq!(resolver.active_plugins(ChannelId(1)).await.unwrap().len(), 1);

        store.update(|s| s.activate(ChannelId(1), "help", PluginSettings::new()));
        assert_eq!(resolver.active_plugins(ChannelId(1)).await.unwrap().len(), 1);

        resolver.invalidate_channel(ChannelId(1));
        let active = resolver.active_plugins(ChannelId(1)).await.unwrap();
        assert!(active.contains("help") && active.contains("brain"));
    }

    #[tokio::test]
    async fn test_unknown_channel_has_no_plugins() {
        let resolver = ActiveConfigResolver::new(store(), None);
        assert!(resolver.active_plugins(ChannelId(99)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_reads_see_complete_values() {
        let resolver = Arc::new(ActiveConfigResolver::new(store(), None));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    resolver.invalidate_channel(ChannelId(1));
                    resolver.plugin_config(ChannelId(1), "brain").await
                })
            })
            .collect();
        for task in tasks {
            let config = task.await.unwrap().unwrap();
            assert_eq!(config.get("mode"), Some(&Value::from("old")));
        }
    }

    /// Reads the store, then holds the result until released.
    struct GatedStore {
        inner: Arc<MemoryStore>,
        entered: Notify,
        release: Notify,
    }

    impl GatedStore {
        async fn gate(&self) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    #[async_trait]
    impl MetadataStore for GatedStore {
        async fn chatbot(&self, id: ChatBotId) -> StoreResult<ChatBot> {
            self.inner.chatbot(id).await
        }

        async fn channel_by_name(
            &self,
            chatbot: ChatBotId,
            name: &str,
        ) -> StoreResult<Option<Channel>> {
            self.inner.channel_by_name(chatbot, name).await
        }

        async fn active_plugins(&self, channel: ChannelId) -> StoreResult<BTreeSet<String>> {
            let active = self.inner.active_plugins(channel).await?;
            self.gate().await;
            Ok(active)
        }

        async fn plugin_config(
            &self,
            channel: ChannelId,
            slug: &str,
        ) -> StoreResult<PluginSettings> {
            let config = self.inner.plugin_config(channel, slug).await?;
            self.gate().await;
            Ok(config)
        }
    }

    #[tokio::test]
    async fn test_invalidation_during_lookup_is_not_lost() {
        let inner = store();
        let gated = Arc::new(GatedStore {
            inner: inner.clone(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let resolver = Arc::new(ActiveConfigResolver::new(gated.clone(), None));

        let lookup = tokio::spawn({
            let resolver = Arc::clone(&resolver);
            async move { resolver.active_plugins(ChannelId(1)).await }
        });
        gated.entered.notified().await;

        inner.update(|s| s.activate(ChannelId(1), "help", PluginSettings::new()));
        resolver.invalidate_channel(ChannelId(1));
        gated.release.notify_one();

        let stale = lookup.await.unwrap().unwrap();
        assert!(!stale.contains("help"));

        let reader = tokio::spawn({
            let resolver = Arc::clone(&resolver);
            async move { resolver.active_plugins(ChannelId(1)).await }
        });
        gated.entered.notified().await;
        gated.release.notify_one();
        let fresh = reader.await.unwrap().unwrap();
        assert!(fresh.contains("help") && fresh.contains("brain"));

        // Served from the cache: a store read would wait on the gate.
        let cached = tokio::time::timeout(
            Duration::from_secs(1),
            resolver.active_plugins(ChannelId(1)),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(cached.contains("help"));
    }

    #[tokio::test]
    async fn test_config_invalidation_during_lookup_is_not_lost() {
        let inner = store();
        let gated = Arc::new(GatedStore {
            inner: inner.clone(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let resolver = Arc::new(ActiveConfigResolver::new(gated.clone(), None));

        let lookup = tokio::spawn({
            let resolver = Arc::clone(&resolver);
            async move { resolver.plugin_config(ChannelId(1), "brain").await }
        });
        gated.entered.notified().await;
        inner.update(|s| s.activate(ChannelId(1), "brain", settings("mode", "new")));
        resolver.invalidate_plugin(ChannelId(1), "brain");
        gated.release.notify_one();
        assert_eq!(
            lookup.await.unwrap().unwrap().get("mode"),
            Some(&Value::from("old"))
        );

        let reader = tokio::spawn({
            let resolver = Arc::clone(&resolver);
            async move { resolver.plugin_config(ChannelId(1), "brain").await }
        });
        gated.entered.notified().await;
        gated.release.notify_one();
        assert_eq!(
            reader.await.unwrap().unwrap().get("mode"),
            Some(&Value::from("new"))
        );
    }
}
