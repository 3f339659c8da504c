//! Line-oriented queues over byte streams.
//!
//! The bot process talks to the runner over two pipes: one JSON packet per
//! line comes in, one `WRITE ...` command per line goes out. [`StdinQueue`]
//! and [`StdoutQueue`] bind those to the process's standard streams.

use std::time::Duration;

use async_trait::async_trait;
use botbot_core::{InboundQueue, OutboundQueue, QueueError, QueueResult};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tracing::trace;

pub type StdinQueue = LineReaderQueue<BufReader<Stdin>>;
pub type StdoutQueue = LineWriterQueue<Stdout>;

/// Inbound queue yielding the non-blank lines of a reader.
///
/// End of input closes the queue.
#[derive(Debug)]
pub struct LineReaderQueue<R> {
    lines: Mutex<Lines<R>>,
}

impl<R: AsyncBufRead + Unpin> LineReaderQueue<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
        }
    }
}

impl StdinQueue {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> InboundQueue for LineReaderQueue<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn pop(&self, timeout: Duration) -> QueueResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        let Ok(mut lines) = timeout_at(deadline, self.lines.lock()).await else {
            return Ok(None);
        };

        loop {
            match timeout_at(deadline, lines.next_line()).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => return Err(QueueError::Transport(e.to_string())),
                Ok(Ok(None)) => return Err(QueueError::Closed),
                Ok(Ok(Some(line))) if line.trim().is_empty() => continue,
                Ok(Ok(Some(line))) => {
                    trace!(bytes = line.len(), "Payload read");
                    return Ok(Some(line));
                }
            }
        }
    }
}

/// Outbound queue writing one command per line and flushing after each.
#[derive(Debug)]
pub struct LineWriterQueue<W> {
    writer: Mutex<W>,
}

impl<W> LineWriterQueue<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl StdoutQueue {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> OutboundQueue for LineWriterQueue<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn push(&self, command: String) -> QueueResult<()> {
        let mut writer = self.writer.lock().await;
        let mut bytes = command.into_bytes();
        bytes.push(b'\n');
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))
    }
}
