//! Per-plugin key-value storage.
//!
//! Keys are namespaced as `{chatbot}:{channel}:{plugin}:{key}` so a plugin can
//! only ever see its own data for the channel it runs in. The backend is
//! shared; no locking is needed because every namespace has a single owner.

use std::sync::Arc;

use botbot_core::KvBackend;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StorageError, StorageResult};

/// The fixed part of a storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: String,
}

impl KeyNamespace {
    /// `channel` is the channel id, or the query target for private lines.
    pub fn new(chatbot: impl std::fmt::Display, channel: impl std::fmt::Display, plugin: &str) -> Self {
        Self {
            prefix: format!("{chatbot}:{channel}:{plugin}"),
        }
    }

    /// Full backend key for a caller-supplied key. Surrounding whitespace is
    /// not significant.
    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key.trim())
    }
}

/// Storage handle bound to one (chatbot, channel, plugin) namespace.
#[derive(Clone)]
pub struct PluginStorage {
    backend: Arc<dyn KvBackend>,
    namespace: KeyNamespace,
}

impl PluginStorage {
    pub fn new(backend: Arc<dyn KvBackend>, namespace: KeyNamespace) -> Self {
        Self { backend, namespace }
    }

    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    pub async fn store(&self, key: &str, value: &str) -> StorageResult<()> {
        Ok(self.backend.set(&self.namespace.key(key), value).await?)
    }

    pub async fn retrieve(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.backend.get(&self.namespace.key(key)).await?)
    }

    /// Removes `key`, returning whether it existed.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.backend.delete(&self.namespace.key(key)).await?)
    }

    /// Stores `value` serialized as JSON.
    pub async fn store_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let encoded = serde_json::to_string(value).map_err(|source| StorageError::Codec {
            key: key.trim().to_string(),
            source,
        })?;
        self.store(key, &encoded).await
    }

    /// Reads a JSON value stored with [`store_json`](Self::store_json).
    pub async fn retrieve_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let Some(raw) = self.retrieve(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Codec {
                key: key.trim().to_string(),
                source,
            })
    }
}

impl std::fmt::Debug for PluginStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginStorage")
            .field("namespace", &self.namespace)
            .finish()
    }
}
