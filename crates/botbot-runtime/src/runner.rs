//! The plugin runner: the inbound loop around a [`Router`].
//!
//! ```text
//! loop {
//!     select! {
//!         shutdown signal      => stop
//!         SIGHUP               => reload chatbots, drop every cache
//!         pop(pop_timeout)     => payload: dispatch, timeout: housekeeping,
//!                                 closed: stop
//!     }
//! }
//! drain in-flight handlers (drain_timeout)
//! ```
//!
//! A payload that cannot be turned into an event is logged and dropped; the
//! loop keeps going.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use botbot_core::{ActivationChange, InboundQueue, KvBackend, MemoryKv, OutboundQueue, QueueError};
use botbot_framework::{
    BUILTIN_PLUGINS, Collaborators, PluginFactory, PluginRegistry, Router, StatsSnapshot,
};
use tracing::{debug, error, info, warn};

use crate::bus::{StdinQueue, StdoutQueue};
use crate::config::{
    BotbotConfig, ConfigResult, KvBackendKind, QueueBackend, QueueConfig, StorageConfig,
    validate_config,
};
use crate::error::{RuntimeError, RuntimeResult};
use crate::store::{ConfigStore, JsonlLogStore};

type ConfigSource = Box<dyn Fn() -> ConfigResult<BotbotConfig> + Send + Sync>;

/// Every plugin shipped with the runner, built-ins first.
pub fn all_plugins() -> Vec<PluginFactory> {
    BUILTIN_PLUGINS
        .iter()
        .chain(botbot_plugins::PLUGINS)
        .copied()
        .collect()
}

/// Pulls payloads off the inbound queue and routes them.
pub struct PluginRunner {
    router: Router,
    inbound: Arc<dyn InboundQueue>,
    pop_timeout: Duration,
    drain_timeout: Duration,
    config_store: Option<Arc<ConfigStore>>,
    config_source: Option<ConfigSource>,
}

impl PluginRunner {
    pub fn new(router: Router, inbound: Arc<dyn InboundQueue>, queue: &QueueConfig) -> Self {
        Self {
            router,
            inbound,
            pop_timeout: queue.pop_timeout(),
            drain_timeout: queue.drain_timeout(),
            config_store: None,
            config_source: None,
        }
    }

    /// Wires a runner over the configured queues and key-value storage, the
    /// configured chatbots and the JSON-lines log file, with every shipped
    /// plugin registered.
    pub async fn from_config(config: &BotbotConfig) -> RuntimeResult<Self> {
        validate_config(config)?;

        let registry = PluginRegistry::from_factories(&all_plugins())?;
        let metadata = Arc::new(ConfigStore::new(&config.chatbots));
        let (inbound, outbound) = connect_queues(&config.queue).await?;
        let collaborators = Collaborators {
            metadata: metadata.clone(),
            logs: Arc::new(JsonlLogStore::new(&config.storage.log_path)),
            kv: connect_kv(&config.storage).await?,
            outbound,
        };

        let router = Router::builder(Arc::new(registry), collaborators)
            .handler_timeout(config.dispatch.handler_timeout())
            .metadata_ttl(config.dispatch.metadata_ttl())
            .config_ttl(config.dispatch.config_ttl())
            .build();

        info!(
            chatbots = config.chatbots.len(),
            plugins = router.registry().len(),
            queue = ?config.queue.backend,
            kv = ?config.storage.kv,
            log_path = %config.storage.log_path.display(),
            "Plugin runner configured"
        );

        let mut runner = Self::new(router, inbound, &config.queue);
        runner.config_store = Some(metadata);
        Ok(runner)
    }

    /// Serves chatbot records from `store`, which [`reload`](Self::reload)
    /// refreshes.
    pub fn config_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Where [`reload`](Self::reload) reads the configuration from.
    pub fn reload_from<F>(mut self, source: F) -> Self
    where
        F: Fn() -> ConfigResult<BotbotConfig> + Send + Sync + 'static,
    {
        self.config_source = Some(Box::new(source));
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Re-reads the chatbot configuration, if a source is set.
    ///
    /// Chatbot and channel records are dropped from the cache. Plugin
    /// activation and configuration are invalidated only for the channels
    /// and plugins that changed. Without a source every cache is dropped.
    pub fn reload(&self) -> RuntimeResult<()> {
        let (Some(store), Some(source)) = (&self.config_store, &self.config_source) else {
            self.router.invalidate_all();
            info!("Caches invalidated");
            return Ok(());
        };

        let config = source()?;
        validate_config(&config)?;
        let changes = store.reload(&config.chatbots);

        self.router.metadata().invalidate_all();
        let resolver = self.router.resolver();
        for change in &changes {
            match change {
                ActivationChange::Plugins(channel) => resolver.invalidate_channel(*channel),
                ActivationChange::Config(channel, slug) => resolver.invalidate_plugin(*channel, slug),
            }
        }
        info!(changes = changes.len(), "Caches invalidated");
        Ok(())
    }

    /// Runs until Ctrl+C, SIGTERM or the end of the inbound queue.
    pub async fn run(&self) -> RuntimeResult<StatsSnapshot> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs until `shutdown` resolves or the inbound queue closes, then
    /// drains running handlers.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<StatsSnapshot>
    where
        F: Future<Output = ()>,
    {
        let mut hangup = Hangup::new()?;
        tokio::pin!(shutdown);

        info!(
            plugins = self.router.registry().len(),
            pop_timeout_ms = self.pop_timeout.as_millis() as u64,
            "Plugin runner started"
        );

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                _ = hangup.recv() => {
                    info!("Received SIGHUP, reloading");
                    if let Err(e) = self.reload() {
                        error!(error = %e, "Reload failed, keeping the current configuration");
                    }
                }
                popped = self.inbound.pop(self.pop_timeout) => match popped {
                    Ok(Some(payload)) => self.process(&payload).await,
                    Ok(None) => self.housekeeping().await,
                    Err(QueueError::Closed) => {
                        info!("Inbound queue closed");
                        break Ok(());
                    }
                    Err(e) => break Err(RuntimeError::Queue(e)),
                }
            }
        };

        if !self.router.drain(self.drain_timeout).await {
            warn!("Stopping with handlers still running");
        }
        let stats = self.router.stats();
        info!(
            lines = stats.lines,
            invocations = stats.invocations,
            replies = stats.replies,
            failures = stats.failures,
            timeouts = stats.timeouts,
            "Plugin runner stopped"
        );
        result.map(|()| stats)
    }

    async fn process(&self, payload: &str) {
        debug!(bytes = payload.len(), "Payload received");
        match self.router.handle(payload).await {
            Ok(dispatched) => debug!(invocations = dispatched.len(), "Line dispatched"),
            Err(e) => error!(error = %e, payload = %payload, "Dropping event"),
        }
    }

    async fn housekeeping(&self) {
        let pending = self.inbound.pending().await;
        debug!(
            pending = ?pending,
            in_flight = self.router.in_flight(),
            "Inbound queue idle"
        );
    }
}

async fn connect_queues(
    queue: &QueueConfig,
) -> RuntimeResult<(Arc<dyn InboundQueue>, Arc<dyn OutboundQueue>)> {
    match queue.backend {
        QueueBackend::Stdio => {
            let inbound: Arc<dyn InboundQueue> = Arc::new(StdinQueue::stdin());
            let outbound: Arc<dyn OutboundQueue> = Arc::new(StdoutQueue::stdout());
            Ok((inbound, outbound))
        }
        #[cfg(feature = "redis-backend")]
        QueueBackend::Redis => {
            let url = queue.url.as_deref().unwrap_or_default();
            let redis = Arc::new(
                crate::redis_backend::RedisQueue::connect(
                    url,
                    &queue.inbound_key,
                    &queue.outbound_key,
                )
                .await?,
            );
            let inbound: Arc<dyn InboundQueue> = redis.clone();
            let outbound: Arc<dyn OutboundQueue> = redis;
            Ok((inbound, outbound))
        }
    }
}

async fn connect_kv(storage: &StorageConfig) -> RuntimeResult<Arc<dyn KvBackend>> {
    match storage.kv {
        KvBackendKind::Memory => {
            warn!("Plugin storage is in memory and will not survive a restart");
            Ok(Arc::new(MemoryKv::new()))
        }
        #[cfg(feature = "redis-backend")]
        KvBackendKind::Redis => {
            let url = storage.kv_url.as_deref().unwrap_or_default();
            Ok(Arc::new(crate::redis_backend::RedisKv::connect(url).await?))
        }
    }
}

impl std::fmt::Debug for PluginRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRunner")
            .field("router", &self.router)
            .field("pop_timeout", &self.pop_timeout)
            .field("drain_timeout", &self.drain_timeout)
            .field("reloadable", &self.config_source.is_some())
            .finish()
    }
}

// =============================================================================
// Signals
// =============================================================================

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}

#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> RuntimeResult<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::hangup())
            .map(Self)
            .map_err(RuntimeError::Signal)
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn new() -> RuntimeResult<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, ChatBotConfig};
    use botbot_core::{MemoryQueue, MemoryStore, OutboundQueue, PluginSettings, QueueResult};
    use botbot_framework::testing::Harness;

    fn harness_runner(active: &[&str]) -> (PluginRunner, Arc<MemoryQueue>, Arc<MemoryQueue>) {
        let Harness {
            router, outbound, ..
        } = Harness::new(&all_plugins(), active);
        let inbound = Arc::new(MemoryQueue::new());
        let queue = QueueConfig {
            pop_timeout_ms: 20,
            drain_timeout_ms: 1000,
            ..Default::default()
        };
        let runner = PluginRunner::new(router, inbound.clone(), &queue);
        (runner, inbound, outbound)
    }

    fn chatbots(active: &[&str]) -> Vec<ChatBotConfig> {
        vec![ChatBotConfig {
            id: 1,
            nick: "botbot".into(),
            server: "chat.freenode.net:6697".into(),
            channels: vec![ChannelConfig {
                id: 10,
                name: "#test".into(),
                slug: Some("test".into()),
                is_public: true,
                plugins: active
                    .iter()
                    .map(|slug| (slug.to_string(), PluginSettings::new()))
                    .collect(),
            }],
        }]
    }

    #[test]
    fn test_all_plugins_register() {
        let registry = PluginRegistry::from_factories(&all_plugins()).unwrap();
        assert_eq!(
            registry.slugs().collect::<Vec<_>>(),
            ["brain", "help", "last_seen", "logger", "ping"]
        );
    }

    #[tokio::test]
    async fn test_runs_until_inbound_closes() {
        let (runner, inbound, outbound) = harness_runner(&["ping", "logger"]);
        inbound.push(Harness::privmsg("botbot: ping", "#test")).await.unwrap();
        inbound.push("not json".into()).await.unwrap();
        inbound.push(Harness::packet("JOIN", "", "#test")).await.unwrap();
        inbound.close();

        let stats = runner.run_until(std::future::pending()).await.unwrap();

        assert_eq!(stats.lines, 2);
        assert_eq!(stats.failures, 0);
        assert_eq!(outbound.drain(), ["WRITE 1 #test pong"]);
        assert_eq!(runner.router().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_loop() {
        let (runner, _inbound, _outbound) = harness_runner(&["ping"]);
        let stats = runner
            .run_until(tokio::time::sleep(Duration::from_millis(60)))
            .await
            .unwrap();
        assert_eq!(stats.lines, 0);
    }

    struct BrokenQueue;

    #[async_trait::async_trait]
    impl InboundQueue for BrokenQueue {
        async fn pop(&self, _timeout: Duration) -> QueueResult<Option<String>> {
            Err(QueueError::Transport("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_transport_error_stops_runner() {
        let Harness { router, .. } = Harness::new(&all_plugins(), &[]);
        let runner = PluginRunner::new(router, Arc::new(BrokenQueue), &QueueConfig::default());
        assert!(matches!(
            runner.run_until(std::future::pending()).await,
            Err(RuntimeError::Queue(QueueError::Transport(_)))
        ));
    }

    fn store_runner<F>(store: Arc<ConfigStore>, source: F) -> (PluginRunner, Arc<MemoryQueue>)
    where
        F: Fn() -> ConfigResult<BotbotConfig> + Send + Sync + 'static,
    {
        let outbound = Arc::new(MemoryQueue::new());
        let registry = PluginRegistry::from_factories(&all_plugins()).unwrap();
        let router = Router::builder(
            Arc::new(registry),
            Collaborators {
                metadata: store.clone(),
                logs: Arc::new(MemoryStore::new()),
                kv: Arc::new(MemoryKv::new()),
                outbound: outbound.clone(),
            },
        )
        .build();
        let runner = PluginRunner::new(router, Arc::new(MemoryQueue::new()), &QueueConfig::default())
            .config_store(store)
            .reload_from(source);
        (runner, outbound)
    }

    #[tokio::test]
    async fn test_reload_activates_new_plugins() {
        let store = Arc::new(ConfigStore::new(&chatbots(&[])));
        let (runner, outbound) = store_runner(store, || {
            Ok(BotbotConfig {
                chatbots: chatbots(&["ping"]),
                ..Default::default()
            })
        });

        let ping = Harness::privmsg("botbot: ping", "#test");
        let outcomes = runner.router().handle(&ping).await.unwrap().join().await;
        assert!(outcomes.is_empty());

        runner.reload().unwrap();
        runner.router().handle(&ping).await.unwrap().join().await;
        assert_eq!(outbound.drain(), ["WRITE 1 #test pong"]);
    }

    #[tokio::test]
    async fn test_reload_refreshes_changed_plugin_config() {
        let with_max_keys = |max_keys: u64| {
            let mut bots = chatbots(&["brain", "ping"]);
            bots[0].channels[0]
                .plugins
                .get_mut("brain")
                .unwrap()
                .insert("max_keys".into(), max_keys.into());
            bots
        };
        let store = Arc::new(ConfigStore::new(&with_max_keys(1)));
        let (runner, _outbound) = store_runner(store, move || {
            Ok(BotbotConfig {
                chatbots: with_max_keys(7),
                ..Default::default()
            })
        });

        let resolver = runner.router().resolver();
        let channel = botbot_core::ChannelId(10);
        assert_eq!(resolver.plugin_config(channel, "brain").await.unwrap()["max_keys"], 1);
        let ping = resolver.plugin_config(channel, "ping").await.unwrap();

        runner.reload().unwrap();

        assert_eq!(resolver.plugin_config(channel, "brain").await.unwrap()["max_keys"], 7);
        // Unchanged entries stay cached.
        assert!(Arc::ptr_eq(
            &ping,
            &resolver.plugin_config(channel, "ping").await.unwrap()
        ));
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_configuration() {
        let store = Arc::new(ConfigStore::new(&chatbots(&["ping"])));
        let Harness { router, .. } = Harness::new(&all_plugins(), &[]);
        let runner = PluginRunner::new(router, Arc::new(MemoryQueue::new()), &QueueConfig::default())
            .config_store(store.clone())
            .reload_from(|| {
                let mut config = BotbotConfig::default();
                config.queue.pop_timeout_ms = 0;
                Ok(config)
            });

        assert!(runner.reload().is_err());
        assert_eq!(
            botbot_core::MetadataStore::active_plugins(&*store, botbot_core::ChannelId(10))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
