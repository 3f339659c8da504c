//! Outbound `WRITE` commands.

use std::sync::Arc;

use botbot_core::{ChatBotId, OutboundQueue, QueueResult};
use tracing::debug;

/// Formats one outbound command for the external bot process.
pub fn write_command(chatbot: ChatBotId, target: &str, line: &str) -> String {
    format!("WRITE {chatbot} {target} {line}")
}

/// Sends handler output to the outbound queue.
#[derive(Clone)]
pub struct Responder {
    queue: Arc<dyn OutboundQueue>,
}

impl Responder {
    pub fn new(queue: Arc<dyn OutboundQueue>) -> Self {
        Self { queue }
    }

    /// Pushes one `WRITE` per non-empty line of `text`, in order, and returns
    /// how many were pushed.
    pub async fn respond(&self, chatbot: ChatBotId, target: &str, text: &str) -> QueueResult<usize> {
        let mut sent = 0;
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            self.queue.push(write_command(chatbot, target, line)).await?;
            sent += 1;
        }
        debug!(chatbot = %chatbot, target = %target, lines = sent, "Reply queued");
        Ok(sent)
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botbot_core::MemoryQueue;

    #[tokio::test]
    async fn test_multi_line_reply_keeps_order() {
        let queue = Arc::new(MemoryQueue::new());
        let responder = Responder::new(queue.clone());

        let sent = responder
            .respond(ChatBotId(1), "#test", "first\n\nsecond\r\nthird\n")
            .await
            .unwrap();
        assert_eq!(sent, 3);
        assert_eq!(
            queue.drain(),
            [
                "WRITE 1 #test first",
                "WRITE 1 #test second",
                "WRITE 1 #test third"
            ]
        );
    }

    #[test]
    fn test_empty_reply_sends_nothing() {
        let queue = Arc::new(MemoryQueue::new());
        let responder = Responder::new(queue.clone());
        let sent = tokio_test::block_on(responder.respond(ChatBotId(1), "alice", " \n"));
        assert_eq!(sent.unwrap(), 0);
        assert!(queue.drain().is_empty());
    }
}
