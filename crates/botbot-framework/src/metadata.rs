//! Chatbot and channel metadata, cached, and envelope construction.

use std::sync::Arc;
use std::time::Duration;

use botbot_core::{
    AddressPattern, Channel, ChatBot, ChatBotId, Line, MetadataStore, Packet, is_channel_name,
};
use tracing::debug;

use crate::cache::TtlCache;
use crate::error::DispatchResult;

/// A chatbot together with the pattern that detects lines addressed to it.
#[derive(Debug)]
pub struct BotIdentity {
    pub chatbot: ChatBot,
    pub address: AddressPattern,
}

/// A parsed line plus the chatbot it arrived on.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub line: Arc<Line>,
    pub bot: Arc<BotIdentity>,
}

/// Caches chatbot and channel records read from the [`MetadataStore`].
///
/// Channels that cannot be resolved are not cached, so a channel created in
/// the web app becomes visible on its next line.
pub struct MetadataCache {
    store: Arc<dyn MetadataStore>,
    chatbots: TtlCache<ChatBotId, Arc<BotIdentity>>,
    channels: TtlCache<(ChatBotId, String), Arc<Channel>>,
}

impl MetadataCache {
    pub fn new(store: Arc<dyn MetadataStore>, ttl: Option<Duration>) -> Self {
        Self {
            store,
            chatbots: TtlCache::new(ttl),
            channels: TtlCache::new(ttl),
        }
    }

    pub async fn chatbot(&self, id: ChatBotId) -> DispatchResult<Arc<BotIdentity>> {
        if let Some(bot) = self.chatbots.get(&id) {
            return Ok(bot);
        }

        let chatbot = self.store.chatbot(id).await?;
        let address = AddressPattern::new(&chatbot.nick)?;
        let bot = Arc::new(BotIdentity { chatbot, address });
        self.chatbots.insert(id, Arc::clone(&bot));
        Ok(bot)
    }

    /// Resolves a channel by name. Private query targets resolve to `None`.
    pub async fn channel(
        &self,
        chatbot: ChatBotId,
        name: &str,
    ) -> DispatchResult<Option<Arc<Channel>>> {
        if !is_channel_name(name) {
            return Ok(None);
        }

        let key = (chatbot, name.to_string());
        if let Some(channel) = self.channels.get(&key) {
            return Ok(Some(channel));
        }

        match self.store.channel_by_name(chatbot, name).await? {
            Some(channel) => {
                let channel = Arc::new(channel);
                self.channels.insert(key, Arc::clone(&channel));
                Ok(Some(channel))
            }
            None => {
                debug!(chatbot = %chatbot, channel = %name, "Channel not found");
                Ok(None)
            }
        }
    }

    /// Turns a raw queue payload into an [`Envelope`].
    pub async fn envelope(&self, payload: &str) -> DispatchResult<Envelope> {
        let packet = Packet::from_json(payload)?;
        let bot = self.chatbot(packet.chatbot_id).await?;
        let line = Line::new(packet, &bot.address)?;
        let channel = self.channel(line.chatbot_id(), line.channel_name()).await?;

        Ok(Envelope {
            line: Arc::new(line.with_channel(channel)),
            bot,
        })
    }

    pub fn invalidate_all(&self) {
        self.chatbots.clear();
        self.channels.clear();
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("chatbots", &self.chatbots)
            .field("channels", &self.channels)
            .finish()
    }
}
