//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use botbot_core::{Channel, ChannelId, ChatBot, ChatBotId, PluginSettings};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotbotConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Chatbots and the channels they log.
    #[serde(default)]
    pub chatbots: Vec<ChatBotConfig>,
}

// =============================================================================
// Logging
// =============================================================================

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines are written.
///
/// Stdout carries outbound commands when the stdio queues are used, so
/// `Stdout` is only accepted with another queue backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level (trace, debug, info, warn, error). `RUST_LOG` wins over it.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line number.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target levels, e.g. `botbot_framework = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            thread_ids: false,
            file_location: false,
            filters: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// Queue & dispatch
// =============================================================================

/// Transport of the inbound and outbound queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Payloads on stdin, commands on stdout. Meant for development.
    #[default]
    Stdio,
    /// Redis lists shared with the bot process.
    #[cfg(feature = "redis-backend")]
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,

    /// Redis URL of the queues, used when `backend = "redis"`.
    #[serde(default)]
    pub url: Option<String>,

    /// List the bot process pushes packets onto.
    #[serde(default = "default_inbound_key")]
    pub inbound_key: String,

    /// List the bot process reads `WRITE` commands from.
    #[serde(default = "default_outbound_key")]
    pub outbound_key: String,

    /// Bounded wait of one inbound pop, in milliseconds.
    #[serde(default = "default_pop_timeout_ms")]
    pub pop_timeout_ms: u64,

    /// How long shutdown waits for running handlers, in milliseconds.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            url: None,
            inbound_key: default_inbound_key(),
            outbound_key: default_outbound_key(),
            pop_timeout_ms: default_pop_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl QueueConfig {
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn default_inbound_key() -> String {
    "q".to_string()
}

fn default_outbound_key() -> String {
    "bot".to_string()
}

fn default_pop_timeout_ms() -> u64 {
    1000
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

/// Router tuning. A value of zero disables the corresponding bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub handler_timeout_ms: u64,

    #[serde(default = "default_metadata_ttl_secs")]
    pub metadata_ttl_secs: u64,

    #[serde(default)]
    pub config_ttl_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 0,
            metadata_ttl_secs: default_metadata_ttl_secs(),
            config_ttl_secs: 0,
        }
    }
}

impl DispatchConfig {
    pub fn handler_timeout(&self) -> Option<Duration> {
        (self.handler_timeout_ms > 0).then(|| Duration::from_millis(self.handler_timeout_ms))
    }

    pub fn metadata_ttl(&self) -> Option<Duration> {
        (self.metadata_ttl_secs > 0).then(|| Duration::from_secs(self.metadata_ttl_secs))
    }

    pub fn config_ttl(&self) -> Option<Duration> {
        (self.config_ttl_secs > 0).then(|| Duration::from_secs(self.config_ttl_secs))
    }
}

fn default_metadata_ttl_secs() -> u64 {
    7200
}

/// Where plugin key-value data lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvBackendKind {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    #[cfg(feature = "redis-backend")]
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON-lines file channel logs are appended to.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    #[serde(default)]
    pub kv: KvBackendKind,

    /// Redis URL of the plugin storage, used when `kv = "redis"`.
    #[serde(default)]
    pub kv_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            kv: KvBackendKind::default(),
            kv_url: None,
        }
    }
}

fn default_log_path() -> PathBuf {
    PathBuf::from("botbot-logs.jsonl")
}

// =============================================================================
// Chatbots & channels
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBotConfig {
    pub id: i64,

    pub nick: String,

    /// `host:port` of the IRC network.
    pub server: String,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl ChatBotConfig {
    pub fn to_chatbot(&self) -> ChatBot {
        ChatBot {
            id: ChatBotId(self.id),
            nick: self.nick.clone(),
            server: self.server.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: i64,

    pub name: String,

    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default = "default_is_public")]
    pub is_public: bool,

    /// Active plugins keyed by slug, each with its channel configuration.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginSettings>,
}

impl ChannelConfig {
    pub fn to_channel(&self, chatbot: ChatBotId) -> Channel {
        Channel {
            id: ChannelId(self.id),
            chatbot_id: chatbot,
            name: self.name.clone(),
            slug: self.slug.clone(),
            is_public: self.is_public,
        }
    }
}

fn default_is_public() -> bool {
    true
}
