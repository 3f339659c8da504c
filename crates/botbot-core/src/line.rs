//! The line envelope: one parsed inbound packet.
//!
//! The external bot process pushes JSON packets such as
//!
//! ```json
//! {"Content": "botbot: help", "User": "alice", "ChatBotId": 1,
//!  "Raw": ":alice!~a@host PRIVMSG #test :botbot: help", "Channel": "#test",
//!  "Command": "PRIVMSG", "Received": "2020-01-01T00:00:00.000000000Z"}
//! ```
//!
//! [`Packet`] is the wire shape; [`Line`] is what plugins see. A `Line` is
//! immutable once built and lives for one dispatch cycle.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LineError, LineResult};
use crate::model::{Channel, ChatBotId};
use crate::timestamp::convert_nano_timestamp;

// =============================================================================
// Command
// =============================================================================

/// The IRC command that produced a packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Command {
    Privmsg,
    Join,
    Quit,
    Part,
    Nick,
    Action,
    Notice,
    Topic,
    Kick,
    Mode,
    Ping,
    Version,
    Error,
    Shutdown,
    /// Anything the bot process forwards that we do not know by name.
    Other(String),
}

impl Command {
    /// Returns the wire name of the command.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Privmsg => "PRIVMSG",
            Self::Join => "JOIN",
            Self::Quit => "QUIT",
            Self::Part => "PART",
            Self::Nick => "NICK",
            Self::Action => "ACTION",
            Self::Notice => "NOTICE",
            Self::Topic => "TOPIC",
            Self::Kick => "KICK",
            Self::Mode => "MODE",
            Self::Ping => "PING",
            Self::Version => "VERSION",
            Self::Error => "ERROR",
            Self::Shutdown => "SHUTDOWN",
            Self::Other(name) => name,
        }
    }

    /// Returns `true` for chat messages, the only lines that reach message
    /// and mention routes.
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Privmsg)
    }
}

impl From<String> for Command {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PRIVMSG" => Self::Privmsg,
            "JOIN" => Self::Join,
            "QUIT" => Self::Quit,
            "PART" => Self::Part,
            "NICK" => Self::Nick,
            "ACTION" => Self::Action,
            "NOTICE" => Self::Notice,
            "TOPIC" => Self::Topic,
            "KICK" => Self::Kick,
            "MODE" => Self::Mode,
            "PING" => Self::Ping,
            "VERSION" => Self::Version,
            "ERROR" => Self::Error,
            "SHUTDOWN" => Self::Shutdown,
            _ => Self::Other(value),
        }
    }
}

impl From<Command> for String {
    fn from(value: Command) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Packet
// =============================================================================

/// Wire representation of an inbound queue message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "Content", default)]
    pub content: String,
    #[serde(rename = "User", default)]
    pub user: String,
    #[serde(rename = "ChatBotId")]
    pub chatbot_id: ChatBotId,
    #[serde(rename = "Raw", default)]
    pub raw: String,
    #[serde(rename = "Channel", default)]
    pub channel: String,
    #[serde(rename = "Command")]
    pub command: Command,
    #[serde(rename = "Received")]
    pub received: String,
}

impl Packet {
    /// Decodes a packet from its JSON queue payload.
    pub fn from_json(payload: &str) -> LineResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

// =============================================================================
// AddressPattern
// =============================================================================

/// Recognises messages addressed to the bot.
///
/// A one-character nick is treated as a command sigil (`!ping`, `@ping`);
/// longer nicks must be followed by `:` or whitespace (`botbot: ping`).
/// Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct AddressPattern {
    nick: String,
    regex: Regex,
}

impl AddressPattern {
    /// Builds the pattern for `nick`.
    pub fn new(nick: &str) -> LineResult<Self> {
        if nick.is_empty() {
            return Err(LineError::InvalidNick(nick.to_string()));
        }

        let escaped = regex::escape(nick);
        let pattern = if nick.chars().count() == 1 {
            format!(r"^{escaped}(.*)")
        } else {
            format!(r"^{escaped}[:\s](.*)")
        };

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|_| LineError::InvalidNick(nick.to_string()))?;

        Ok(Self {
            nick: nick.to_string(),
            regex,
        })
    }

    /// The nick this pattern was built for.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Returns the text after the address, left-trimmed, if `text` is
    /// addressed to the bot.
    pub fn strip<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_start())
    }
}

// =============================================================================
// Line
// =============================================================================

/// A parsed inbound line, as seen by plugins.
#[derive(Debug, Clone)]
pub struct Line {
    full_text: String,
    text: String,
    user: String,
    chatbot_id: ChatBotId,
    raw: String,
    channel_name: String,
    command: Command,
    received: DateTime<Utc>,
    is_direct_message: bool,
    channel: Option<Arc<Channel>>,
}

impl Line {
    /// Builds a line from a decoded packet.
    ///
    /// A packet whose target equals the bot's own nick is a private query:
    /// the effective channel becomes the sender so replies go back to them.
    /// Otherwise the text is checked for an address prefix, which is stripped
    /// from [`text`](Self::text).
    pub fn new(packet: Packet, address: &AddressPattern) -> LineResult<Self> {
        let received = convert_nano_timestamp(&packet.received)?;
        let mut channel_name = packet.channel.trim().to_string();
        let mut text = packet.content.clone();

        let is_direct_message = if channel_name == address.nick() {
            debug!(user = %packet.user, "Private message detected");
            channel_name.clone_from(&packet.user);
            true
        } else if let Some(rest) = address.strip(&packet.content) {
            debug!(user = %packet.user, "Direct message detected");
            text = rest.to_string();
            true
        } else {
            false
        };

        Ok(Self {
            full_text: packet.content,
            text,
            user: packet.user,
            chatbot_id: packet.chatbot_id,
            raw: packet.raw,
            channel_name,
            command: packet.command,
            received,
            is_direct_message,
            channel: None,
        })
    }

    /// Attaches the resolved channel record.
    pub fn with_channel(mut self, channel: Option<Arc<Channel>>) -> Self {
        self.channel = channel;
        self
    }

    /// The message text exactly as received.
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// The message text with any bot address stripped.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Nick of the sender.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn chatbot_id(&self) -> ChatBotId {
        self.chatbot_id
    }

    /// The original protocol line.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Effective target: the channel name, or the sender for private queries.
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn received(&self) -> DateTime<Utc> {
        self.received
    }

    pub fn is_message(&self) -> bool {
        self.command.is_message()
    }

    pub fn is_direct_message(&self) -> bool {
        self.is_direct_message
    }

    /// The resolved channel record, `None` for private queries and unknown
    /// channels.
    pub fn channel(&self) -> Option<&Arc<Channel>> {
        self.channel.as_ref()
    }

    /// Sender host taken from the raw `:nick!user@host` prefix.
    pub fn host(&self) -> Option<&str> {
        let prefix = self.raw.strip_prefix(':')?.split_whitespace().next()?;
        prefix.split_once('@').map(|(_, host)| host)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(content: &str, channel: &str) -> Packet {
        Packet {
            content: content.to_string(),
            user: "alice".to_string(),
            chatbot_id: ChatBotId(1),
            raw: format!(":alice!~alice@example.com PRIVMSG {channel} :{content}"),
            channel: channel.to_string(),
            command: Command::Privmsg,
            received: "2014-01-27T16:35:53.123456789Z".to_string(),
        }
    }

    fn line(content: &str, nick: &str) -> Line {
        let address = AddressPattern::new(nick).unwrap();
        Line::new(packet(content, "#test"), &address).unwrap()
    }

    #[test]
    fn test_single_char_nick_is_sigil() {
        let line = line("@ping", "@");
        assert!(line.is_direct_message());
        assert_eq!(line.text(), "ping");
        assert_eq!(line.full_text(), "@ping");
    }

    #[test]
    fn test_nick_with_colon_or_space() {
        for content in ["botbot: ping", "botbot ping", "BotBot:   ping"] {
            let line = line(content, "botbot");
            assert!(line.is_direct_message(), "{content}");
            assert_eq!(line.text(), "ping");
        }
    }

    #[test]
    fn test_nick_without_separator_is_not_direct() {
        let line = line("botbotping", "botbot");
        assert!(!line.is_direct_message());
        assert_eq!(line.text(), "botbotping");
    }

    #[test]
    fn test_nick_is_escaped() {
        let line = line("b.t: hi", "b.t");
        assert!(line.is_direct_message());
        assert!(!super::tests::line("bot: hi", "b.t").is_direct_message());
    }

    #[test]
    fn test_private_query_targets_sender() {
        let address = AddressPattern::new("botbot").unwrap();
        let line = Line::new(packet("hello", " botbot "), &address).unwrap();
        assert!(line.is_direct_message());
        assert_eq!(line.channel_name(), "alice");
        assert_eq!(line.text(), "hello");
    }

    #[test]
    fn test_malformed_timestamp_fails() {
        let address = AddressPattern::new("botbot").unwrap();
        let mut p = packet("hi", "#test");
        p.received = "not a time".to_string();
        assert!(matches!(
            Line::new(p, &address),
            Err(LineError::MalformedTimestamp(_))
        ));
    }

    #[test]
    fn test_empty_nick_rejected() {
        assert!(matches!(
            AddressPattern::new(""),
            Err(LineError::InvalidNick(_))
        ));
    }

    #[test]
    fn test_host_from_raw_prefix() {
        let line = line("hi", "botbot");
        assert_eq!(line.host(), Some("example.com"));
    }

    #[test]
    fn test_packet_from_json() {
        let payload = r##"{"Content":"hi","User":"bob","ChatBotId":"3","Raw":"","Channel":"#x","Command":"JOIN","Received":"2020-01-01T00:00:00.0Z"}"##;
        let packet = Packet::from_json(payload).unwrap();
        assert_eq!(packet.chatbot_id, ChatBotId(3));
        assert_eq!(packet.command, Command::Join);
        assert!(!packet.command.is_message());

        let odd = r##"{"ChatBotId":1,"Command":"WALLOPS","Received":"x"}"##;
        let packet = Packet::from_json(odd).unwrap();
        assert_eq!(packet.command, Command::Other("WALLOPS".into()));
        assert!(Packet::from_json("{").is_err());
    }
}
