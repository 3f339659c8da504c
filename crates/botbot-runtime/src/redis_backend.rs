//! Redis lists and keys shared with the bot process and the web app.
//!
//! - [`RedisQueue`]: inbound packets with `BLPOP <inbound_key>`, outbound
//!   commands with `LPUSH <outbound_key>`
//! - [`RedisKv`]: plugin key-value data with `GET`/`SET`/`DEL`
//!
//! Both hold [`ConnectionManager`]s, which reconnect on their own. A blocking
//! pop holds its connection for the whole wait, so the queue keeps it apart
//! from the connection used for pushes.

use std::time::Duration;

use async_trait::async_trait;
use botbot_core::{
    InboundQueue, KvBackend, OutboundQueue, QueueError, QueueResult, StoreError, StoreResult,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use tracing::{debug, trace, warn};

use crate::error::{RuntimeError, RuntimeResult};

async fn connect(url: &str) -> RuntimeResult<ConnectionManager> {
    let connect_error = |source| RuntimeError::Connect {
        url: url.to_string(),
        source,
    };
    let client = Client::open(url).map_err(connect_error)?;
    let manager = ConnectionManager::new(client).await.map_err(connect_error)?;
    debug!(url = %url, "Connected to redis");
    Ok(manager)
}

/// Errors a reconnect can recover from.
fn is_transient(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

// =============================================================================
// Queues
// =============================================================================

/// The packet and command lists of the bot process.
#[derive(Clone)]
pub struct RedisQueue {
    blocking: ConnectionManager,
    commands: ConnectionManager,
    inbound_key: String,
    outbound_key: String,
}

impl RedisQueue {
    pub async fn connect(
        url: &str,
        inbound_key: impl Into<String>,
        outbound_key: impl Into<String>,
    ) -> RuntimeResult<Self> {
        Ok(Self {
            blocking: connect(url).await?,
            commands: connect(url).await?,
            inbound_key: inbound_key.into(),
            outbound_key: outbound_key.into(),
        })
    }

    pub fn inbound_key(&self) -> &str {
        &self.inbound_key
    }

    pub fn outbound_key(&self) -> &str {
        &self.outbound_key
    }
}

#[async_trait]
impl InboundQueue for RedisQueue {
    async fn pop(&self, timeout: Duration) -> QueueResult<Option<String>> {
        let mut conn = self.blocking.clone();
        let popped: RedisResult<Option<(String, String)>> =
            conn.blpop(&self.inbound_key, timeout.as_secs_f64()).await;

        match popped {
            Ok(entry) => Ok(entry.map(|(_, payload)| payload)),
            Err(e) if is_transient(&e) => {
                warn!(error = %e, key = %self.inbound_key, "Inbound pop failed, retrying");
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Err(e) => Err(QueueError::Transport(e.to_string())),
        }
    }

    async fn pending(&self) -> Option<usize> {
        let mut conn = self.commands.clone();
        match conn.llen::<_, usize>(&self.inbound_key).await {
            Ok(len) => Some(len),
            Err(e) => {
                debug!(error = %e, "Could not read inbound queue length");
                None
            }
        }
    }
}

#[async_trait]
impl OutboundQueue for RedisQueue {
    async fn push(&self, command: String) -> QueueResult<()> {
        let mut conn = self.commands.clone();
        conn.lpush::<_, _, ()>(&self.outbound_key, &command)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        trace!(key = %self.outbound_key, command = %command, "Command pushed");
        Ok(())
    }
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue")
            .field("inbound_key", &self.inbound_key)
            .field("outbound_key", &self.outbound_key)
            .finish()
    }
}

// =============================================================================
// Key-value storage
// =============================================================================

/// Plugin key-value data in a redis database.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
    pub async fn connect(url: &str) -> RuntimeResult<Self> {
        Ok(Self {
            conn: connect(url).await?,
        })
    }
}

#[async_trait]
impl KvBackend for RedisKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.del(key).await.map_err(StoreError::unavailable)?;
        Ok(removed == 1)
    }
}

impl std::fmt::Debug for RedisKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKv").finish_non_exhaustive()
    }
}

/// These tests talk to the server named by `BOTBOT_TEST_REDIS_URL` and are
/// skipped when it is unset.
#[cfg(test)]
mod tests {
    use super::*;

    fn test_url() -> Option<String> {
        std::env::var("BOTBOT_TEST_REDIS_URL").ok()
    }

    fn unique(name: &str) -> String {
        format!(
            "botbot-test:{}:{name}:{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        )
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        assert!(matches!(
            RedisKv::connect("not a url").await,
            Err(RuntimeError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn test_kv_roundtrip_survives_reconnect() {
        let Some(url) = test_url() else { return };
        let key = unique("kv");

        let kv = RedisKv::connect(&url).await.unwrap();
        kv.set(&key, "every tuesday").await.unwrap();

        // A second connection stands in for a restarted runner.
        let restarted = RedisKv::connect(&url).await.unwrap();
        assert_eq!(restarted.get(&key).await.unwrap().as_deref(), Some("every tuesday"));
        assert!(restarted.delete(&key).await.unwrap());
        assert!(!restarted.delete(&key).await.unwrap());
        assert_eq!(kv.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_queue_pops_in_push_order_and_times_out() {
        let Some(url) = test_url() else { return };
        let inbound = unique("q");
        let outbound = unique("bot");
        let queue = RedisQueue::connect(&url, &inbound, &outbound).await.unwrap();

        let mut conn = connect(&url).await.unwrap();
        conn.rpush::<_, _, ()>(&inbound, vec!["first", "second"]).await.unwrap();
        assert_eq!(queue.pending().await, Some(2));

        let wait = Duration::from_millis(100);
        assert_eq!(queue.pop(wait).await.unwrap().as_deref(), Some("first"));
        assert_eq!(queue.pop(wait).await.unwrap().as_deref(), Some("second"));
        assert_eq!(queue.pop(wait).await.unwrap(), None);

        queue.push("WRITE 1 #test pong".into()).await.unwrap();
        let written: Vec<String> = conn.lrange(&outbound, 0, -1).await.unwrap();
        assert_eq!(written, ["WRITE 1 #test pong"]);
        conn.del::<_, ()>(&outbound).await.unwrap();
    }
}
