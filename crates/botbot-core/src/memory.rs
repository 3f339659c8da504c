//! In-memory collaborators.
//!
//! These back the test suites and the config-driven runtime store. They keep
//! everything in process memory behind `parking_lot` locks and never block
//! across an `.await`.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{QueueError, QueueResult, StoreError, StoreResult};
use crate::model::{Channel, ChannelId, ChatBot, ChatBotId, LogEntry};
use crate::store::{InboundQueue, KvBackend, LogStore, MetadataStore, OutboundQueue, PluginSettings};

// =============================================================================
// MetadataSnapshot
// =============================================================================

/// A complete, replaceable view of chatbots, channels and plugin activation.
#[derive(Debug, Clone, Default)]
pub struct MetadataSnapshot {
    chatbots: HashMap<ChatBotId, ChatBot>,
    channels: HashMap<(ChatBotId, String), Channel>,
    activations: HashMap<ChannelId, BTreeMap<String, PluginSettings>>,
}

impl MetadataSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chatbot(&mut self, chatbot: ChatBot) {
        self.chatbots.insert(chatbot.id, chatbot);
    }

    pub fn add_channel(&mut self, channel: Channel) {
        self.channels
            .insert((channel.chatbot_id, channel.name.clone()), channel);
    }

    /// Enables `slug` in `channel` with the given configuration.
    pub fn activate(&mut self, channel: ChannelId, slug: impl Into<String>, settings: PluginSettings) {
        self.activations
            .entry(channel)
            .or_default()
            .insert(slug.into(), settings);
    }

    /// Disables `slug` in `channel`.
    pub fn deactivate(&mut self, channel: ChannelId, slug: &str) {
        if let Some(plugins) = self.activations.get_mut(&channel) {
            plugins.remove(slug);
        }
    }

    /// Activation differences between `self` and `next`, ordered by channel.
    ///
    /// A channel whose set of active plugins changed is reported once as
    /// [`ActivationChange::Plugins`]; otherwise each plugin whose
    /// configuration changed is reported as [`ActivationChange::Config`].
    pub fn activation_changes(&self, next: &MetadataSnapshot) -> Vec<ActivationChange> {
        let empty = BTreeMap::new();
        let channels: BTreeSet<ChannelId> = self
            .activations
            .keys()
            .chain(next.activations.keys())
            .copied()
            .collect();

        let mut changes = Vec::new();
        for channel in channels {
            let before = self.activations.get(&channel).unwrap_or(&empty);
            let after = next.activations.get(&channel).unwrap_or(&empty);
            if !before.keys().eq(after.keys()) {
                changes.push(ActivationChange::Plugins(channel));
                continue;
            }
            changes.extend(
                before
                    .iter()
                    .zip(after.values())
                    .filter(|((_, old), new)| old != new)
                    .map(|((slug, _), _)| ActivationChange::Config(channel, slug.clone())),
            );
        }
        changes
    }
}

/// One difference between two activation views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationChange {
    /// Plugins were enabled or disabled in the channel.
    Plugins(ChannelId),
    /// The configuration of one plugin changed.
    Config(ChannelId, String),
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory [`MetadataStore`] and [`LogStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: RwLock<MetadataSnapshot>,
    logs: Mutex<Vec<LogEntry>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: MetadataSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            ..Self::default()
        }
    }

    /// Swaps the whole metadata view at once, returning the previous one.
    pub fn replace(&self, snapshot: MetadataSnapshot) -> MetadataSnapshot {
        std::mem::replace(&mut *self.snapshot.write(), snapshot)
    }

    /// Applies an in-place edit to the metadata view.
    pub fn update(&self, f: impl FnOnce(&mut MetadataSnapshot)) {
        f(&mut self.snapshot.write());
    }

    /// Makes every call fail with [`StoreError::Unavailable`] while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All log entries persisted so far.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().clone()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("memory store switched off"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn chatbot(&self, id: ChatBotId) -> StoreResult<ChatBot> {
        self.check_available()?;
        self.snapshot
            .read()
            .chatbots
            .get(&id)
            .cloned()
            .ok_or(StoreError::ChatBotNotFound(id))
    }

    async fn channel_by_name(
        &self,
        chatbot: ChatBotId,
        name: &str,
    ) -> StoreResult<Option<Channel>> {
        self.check_available()?;
        Ok(self
            .snapshot
            .read()
            .channels
            .get(&(chatbot, name.to_string()))
            .cloned())
    }

    async fn active_plugins(&self, channel: ChannelId) -> StoreResult<BTreeSet<String>> {
        self.check_available()?;
        Ok(self
            .snapshot
            .read()
            .activations
            .get(&channel)
            .map(|plugins| plugins.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn plugin_config(&self, channel: ChannelId, slug: &str) -> StoreResult<PluginSettings> {
        self.check_available()?;
        Ok(self
            .snapshot
            .read()
            .activations
            .get(&channel)
            .and_then(|plugins| plugins.get(slug))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn create_log_entry(&self, entry: LogEntry) -> StoreResult<()> {
        self.check_available()?;
        self.logs.lock().push(entry);
        Ok(())
    }
}

// =============================================================================
// MemoryKv
// =============================================================================

/// In-memory [`KvBackend`].
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

// =============================================================================
// MemoryQueue
// =============================================================================

/// FIFO queue usable as both [`InboundQueue`] and [`OutboundQueue`].
///
/// Items pushed before [`close`](Self::close) are still delivered; after the
/// queue is drained, `pop` reports [`QueueError::Closed`].
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops accepting pushes and wakes every waiting consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Removes and returns everything currently queued.
    pub fn drain(&self) -> Vec<String> {
        self.items.lock().drain(..).collect()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InboundQueue for MemoryQueue {
    async fn pop(&self, timeout: Duration) -> QueueResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before looking at the queue so a push between
            // the check and the wait is not missed.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if let Some(item) = self.items.lock().pop_front() {
                return Ok(Some(item));
            }
            if self.is_closed() {
                return Err(QueueError::Closed);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn pending(&self) -> Option<usize> {
        Some(self.items.lock().len())
    }
}

#[async_trait]
impl OutboundQueue for MemoryQueue {
    async fn push(&self, command: String) -> QueueResult<()> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        self.items.lock().push_back(command);
        self.notify.notify_one();
        Ok(())
    }
}
