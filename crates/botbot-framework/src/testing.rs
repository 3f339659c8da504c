//! Test support: a router wired to in-memory collaborators.
//!
//! The harness knows one chatbot (`1`, nick `botbot`, on freenode) and one
//! public channel (`#test`, id `10`) with the requested plugins active.
//! Helpers here panic on setup errors; they are meant for tests only.

use std::sync::Arc;
use std::time::Duration;

use botbot_core::{
    Channel, ChannelId, ChatBot, ChatBotId, MemoryKv, MemoryQueue, MemoryStore, MetadataSnapshot,
    PluginSettings,
};

use crate::dispatcher::{Collaborators, Outcome, Router};
use crate::plugin::PluginFactory;
use crate::registry::PluginRegistry;

pub const CHATBOT: ChatBotId = ChatBotId(1);
pub const CHANNEL: ChannelId = ChannelId(10);

/// Builder for [`Harness`].
pub struct HarnessBuilder {
    registry: PluginRegistry,
    snapshot: MetadataSnapshot,
    handler_timeout: Option<Duration>,
}

impl HarnessBuilder {
    pub fn handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Stores channel configuration for an active plugin.
    pub fn config(mut self, slug: &str, settings: PluginSettings) -> Self {
        self.snapshot.activate(CHANNEL, slug, settings);
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::from_snapshot(self.snapshot));
        let kv = Arc::new(MemoryKv::new());
        let outbound = Arc::new(MemoryQueue::new());

        let router = Router::builder(
            Arc::new(self.registry),
            Collaborators {
                metadata: store.clone(),
                logs: store.clone(),
                kv: kv.clone(),
                outbound: outbound.clone(),
            },
        )
        .handler_timeout(self.handler_timeout)
        .build();

        Harness {
            store,
            kv,
            outbound,
            router,
        }
    }
}

/// A router over in-memory stores and queues.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub kv: Arc<MemoryKv>,
    pub outbound: Arc<MemoryQueue>,
    pub router: Router,
}

impl Harness {
    /// # Panics
    ///
    /// If a plugin fails to register.
    pub fn builder(factories: &[PluginFactory], active: &[&str]) -> HarnessBuilder {
        let registry = PluginRegistry::from_factories(factories).expect("plugins register");

        let mut snapshot = MetadataSnapshot::new();
        snapshot.add_chatbot(ChatBot {
            id: CHATBOT,
            nick: "botbot".into(),
            server: "chat.freenode.net:6697".into(),
        });
        snapshot.add_channel(Channel {
            id: CHANNEL,
            chatbot_id: CHATBOT,
            name: "#test".into(),
            slug: Some("test".into()),
            is_public: true,
        });
        for slug in active {
            snapshot.activate(CHANNEL, *slug, PluginSettings::new());
        }

        HarnessBuilder {
            registry,
            snapshot,
            handler_timeout: None,
        }
    }

    pub fn new(factories: &[PluginFactory], active: &[&str]) -> Self {
        Self::builder(factories, active).build()
    }

    /// A queue payload from `alice`.
    pub fn packet(command: &str, content: &str, channel: &str) -> String {
        serde_json::json!({
            "Content": content,
            "User": "alice",
            "ChatBotId": CHATBOT.0,
            "Raw": format!(":alice!~alice@example.com {command} {channel} :{content}"),
            "Channel": channel,
            "Command": command,
            "Received": "2020-01-01T00:00:00.000000000Z",
        })
        .to_string()
    }

    pub fn privmsg(content: &str, channel: &str) -> String {
        Self::packet("PRIVMSG", content, channel)
    }

    /// Dispatches `payload` and waits for every invocation.
    ///
    /// # Panics
    ///
    /// If the payload is dropped by the router.
    pub async fn handle(&self, payload: &str) -> Vec<Outcome> {
        self.router
            .handle(payload)
            .await
            .expect("payload dispatches")
            .join()
            .await
    }
}
