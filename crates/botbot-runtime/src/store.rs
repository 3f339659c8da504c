//! Stores backing the runner outside of tests.
//!
//! - [`ConfigStore`] serves chatbot, channel and activation records from the
//!   `[[chatbots]]` configuration and can be reloaded in place.
//! - [`JsonlLogStore`] appends channel logs to a JSON-lines file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use botbot_core::{
    ActivationChange, Channel, ChannelId, ChatBot, ChatBotId, LogEntry, LogStore, MemoryStore, MetadataSnapshot,
    MetadataStore, PluginSettings, StoreError, StoreResult,
};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ChatBotConfig;

// =============================================================================
// ConfigStore
// =============================================================================

/// Metadata store built from configuration.
#[derive(Debug, Default)]
pub struct ConfigStore {
    inner: MemoryStore,
}

impl ConfigStore {
    pub fn new(chatbots: &[ChatBotConfig]) -> Self {
        Self {
            inner: MemoryStore::from_snapshot(Self::snapshot(chatbots)),
        }
    }

    /// Replaces every record with those in `chatbots` and reports which
    /// plugin activations changed.
    pub fn reload(&self, chatbots: &[ChatBotConfig]) -> Vec<ActivationChange> {
        let next = Self::snapshot(chatbots);
        let changes = self.inner.replace(next.clone()).activation_changes(&next);
        info!(
            chatbots = chatbots.len(),
            changes = changes.len(),
            "Chatbot configuration reloaded"
        );
        changes
    }

    fn snapshot(chatbots: &[ChatBotConfig]) -> MetadataSnapshot {
        let mut snapshot = MetadataSnapshot::new();
        for chatbot in chatbots {
            let id = ChatBotId(chatbot.id);
            snapshot.add_chatbot(chatbot.to_chatbot());
            for channel in &chatbot.channels {
                snapshot.add_channel(channel.to_channel(id));
                for (slug, settings) in &channel.plugins {
                    snapshot.activate(ChannelId(channel.id), slug.clone(), settings.clone());
                }
            }
        }
        snapshot
    }
}

#[async_trait]
impl MetadataStore for ConfigStore {
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
        self.inner.active_plugins(channel).await
    }

    async fn plugin_config(&self, channel: ChannelId, slug: &str) -> StoreResult<PluginSettings> {
        self.inner.plugin_config(channel, slug).await
    }
}

// =============================================================================
// JsonlLogStore
// =============================================================================

/// Appends one JSON object per [`LogEntry`] to a file.
///
/// The file is opened on the first write, so a missing directory only
/// surfaces as a failed log write.
#[derive(Debug)]
pub struct JsonlLogStore {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogStore for JsonlLogStore {
    async fn create_log_entry(&self, entry: LogEntry) -> StoreResult<()> {
        let mut line = serde_json::to_string(&entry).map_err(StoreError::unavailable)?;
        line.push('\n');

        let mut guard = self.file.lock().await;
        let mut file = match guard.take() {
            Some(file) => file,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await
                    .map_err(|e| StoreError::unavailable(format!("{}: {e}", self.path.display())))?;
                debug!(path = %self.path.display(), "Log file opened");
                file
            }
        };

        let written = append(&mut file, line.as_bytes()).await;
        *guard = Some(file);
        written.map_err(StoreError::unavailable)
    }
}

async fn append(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn chatbots(plugins: &[&str]) -> Vec<ChatBotConfig> {
        vec![ChatBotConfig {
            id: 1,
            nick: "botbot".into(),
            server: "chat.freenode.net:6697".into(),
            channels: vec![ChannelConfig {
                id: 10,
                name: "#test".into(),
                slug: Some("test".into()),
                is_public: true,
                plugins: plugins
                    .iter()
                    .map(|slug| {
                        let mut settings = PluginSettings::new();
                        settings.insert("slug".into(), json!(slug));
                        (slug.to_string(), settings)
                    })
                    .collect(),
            }],
        }]
    }

    fn entry(text: &str) -> LogEntry {
        LogEntry {
            channel_id: ChannelId(10),
            timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            nick: "alice".into(),
            text: text.into(),
            room: "#test".into(),
            host: Some("example.com".into()),
            command: "PRIVMSG".into(),
            raw: format!(":alice!~alice@example.com PRIVMSG #test :{text}"),
        }
    }

    #[tokio::test]
    async fn test_config_store_serves_configured_records() {
        let store = ConfigStore::new(&chatbots(&["help", "logger"]));

        assert_eq!(store.chatbot(ChatBotId(1)).await.unwrap().nick, "botbot");
        let channel = store
            .channel_by_name(ChatBotId(1), "#test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel.id, ChannelId(10));
        assert_eq!(
            store.active_plugins(ChannelId(10)).await.unwrap(),
            BTreeSet::from(["help".to_string(), "logger".to_string()])
        );
        assert_eq!(
            store.plugin_config(ChannelId(10), "help").await.unwrap()["slug"],
            "help"
        );
        assert!(matches!(
            store.chatbot(ChatBotId(2)).await,
            Err(StoreError::ChatBotNotFound(_))
        ));
    }

    #[test]
    fn test_config_store_reload() {
        let store = ConfigStore::new(&chatbots(&["help"]));
        assert_eq!(
            store.reload(&chatbots(&["logger"])),
            [ActivationChange::Plugins(ChannelId(10))]
        );
        assert!(store.reload(&chatbots(&["logger"])).is_empty());
        assert_eq!(
            tokio_test::block_on(store.active_plugins(ChannelId(10))).unwrap(),
            BTreeSet::from(["logger".to_string()])
        );
    }

    #[tokio::test]
    async fn test_jsonl_appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.jsonl");
        let store = JsonlLogStore::new(&path);

        store.create_log_entry(entry("hello")).await.unwrap();
        store.create_log_entry(entry("world")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<LogEntry> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries, [entry("hello"), entry("world")]);
    }

    #[tokio::test]
    async fn test_jsonl_unwritable_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlLogStore::new(dir.path().join("missing").join("logs.jsonl"));
        assert!(matches!(
            store.create_log_entry(entry("hello")).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
