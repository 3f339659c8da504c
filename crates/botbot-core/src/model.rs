//! Metadata records shared with the web application's data store.
//!
//! The runner never owns these: they are read from the authoritative store
//! through [`MetadataStore`](crate::MetadataStore) and cached.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Characters that start a real IRC channel name. Any other target is a
/// private query between a user and the bot.
pub const CHANNEL_PREFIXES: [char; 2] = ['#', '&'];

/// Returns `true` if `name` addresses a channel rather than a user.
pub fn is_channel_name(name: &str) -> bool {
    name.starts_with(CHANNEL_PREFIXES)
}

/// Networks whose server host is shown under a shorter name.
const PRETTY_SLUG: &[(&str, &str)] = &[
    ("chat.freenode.net", "freenode"),
    ("irc.oftc.net", "oftc"),
    ("irc.mozilla.org", "mozilla"),
    ("irc.coldfront.net", "coldfront"),
    ("irc.synirc.net", "synirc"),
];

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a chatbot (one IRC connection of the external bot process).
///
/// The bot process sends it either as a JSON integer or as a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChatBotId(pub i64);

impl<'de> Deserialize<'de> for ChatBotId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(i64),
            Str(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Int(id) => Ok(Self(id)),
            Repr::Str(s) => s
                .trim()
                .parse()
                .map(Self)
                .map_err(serde::de::Error::custom),
        }
    }
}

impl fmt::Display for ChatBotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a logged channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Records
// =============================================================================

/// A chatbot: the identity the external bot process uses on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBot {
    pub id: ChatBotId,
    /// Nickname the bot answers to.
    pub nick: String,
    /// Server address, e.g. `chat.freenode.net:6697`.
    #[serde(default)]
    pub server: String,
}

impl ChatBot {
    /// Short network name used in public URLs.
    pub fn slug(&self) -> String {
        let host = self.server.split(':').next().unwrap_or_default();
        PRETTY_SLUG
            .iter()
            .find(|(server, _)| *server == host)
            .map(|(_, slug)| (*slug).to_string())
            .unwrap_or_else(|| host.to_string())
    }
}

/// A channel the bot sits in and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub chatbot_id: ChatBotId,
    /// Channel name including its prefix, e.g. `#django`.
    pub name: String,
    /// URL slug; when absent the name without its prefix is used.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

impl Channel {
    /// Slug used when building URLs for this channel.
    pub fn url_slug(&self) -> String {
        match &self.slug {
            Some(slug) if !slug.is_empty() => slug.clone(),
            _ => self.name.trim_start_matches(CHANNEL_PREFIXES).to_string(),
        }
    }
}

/// One persisted line of channel activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub channel_id: ChannelId,
    pub timestamp: DateTime<Utc>,
    pub nick: String,
    pub text: String,
    pub room: String,
    pub host: Option<String>,
    pub command: String,
    pub raw: String,
}
