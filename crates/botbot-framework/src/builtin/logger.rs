//! Built-in `logger` plugin: persists channel activity.

use botbot_core::{LogEntry, is_channel_name};
use tower::BoxError;
use tracing::trace;

use crate::handler::Invocation;
use crate::plugin::PluginDefinition;

pub const SLUG: &str = "logger";

const DOCS: &str = "Logs all activity.

I keep extensive logs on all the activity in `{{ channel.name }}`.";

pub fn plugin() -> PluginDefinition {
    PluginDefinition::new(SLUG).docs(DOCS).firehose("logit", logit)
}

async fn logit(inv: Invocation) -> Result<(), BoxError> {
    let line = &inv.line;
    // Lines of a private query are never logged.
    if !is_channel_name(line.channel_name()) {
        return Ok(());
    }
    let Some(channel) = inv.ctx.channel() else {
        return Ok(());
    };

    inv.ctx
        .log(LogEntry {
            channel_id: channel.id,
            timestamp: line.received(),
            nick: line.user().to_string(),
            text: line.full_text().to_string(),
            room: channel.name.clone(),
            host: line.host().map(str::to_string),
            command: line.command().to_string(),
            raw: line.raw().to_string(),
        })
        .await?;
    trace!(channel = %channel.name, "Line logged");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::BUILTIN_PLUGINS;
    use crate::dispatcher::Outcome;
    use crate::testing::{CHANNEL, Harness};

    #[tokio::test]
    async fn test_join_is_logged_without_replies() {
        let harness = Harness::new(BUILTIN_PLUGINS, &["logger"]);
        let outcomes = harness
            .handle(&Harness::packet("JOIN", "", "#test"))
            .await;

        assert_eq!(outcomes, [Outcome::Silent]);
        assert!(harness.outbound.drain().is_empty());

        let logs = harness.store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].channel_id, CHANNEL);
        assert_eq!(logs[0].command, "JOIN");
        assert_eq!(logs[0].nick, "alice");
        assert_eq!(logs[0].host.as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_messages_keep_full_text() {
        let harness = Harness::new(BUILTIN_PLUGINS, &["logger", "help"]);
        harness
            .handle(&Harness::privmsg("botbot: help", "#test"))
            .await;

        let logs = harness.store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].text, "botbot: help");
        assert_eq!(logs[0].room, "#test");
        assert_eq!(harness.outbound.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_log_store_failure_is_contained() {
        let harness = Harness::new(BUILTIN_PLUGINS, &["logger"]);
        let envelope = harness
            .router
            .metadata()
            .envelope(&Harness::privmsg("hello", "#test"))
            .await
            .unwrap();
        // Resolve the active set first so only the log write hits the outage.
        harness.router.resolver().plugin_config(CHANNEL, SLUG).await.unwrap();
        harness.router.resolver().active_plugins(CHANNEL).await.unwrap();
        harness.store.set_unavailable(true);

        let outcomes = harness.router.dispatch(&envelope).await.unwrap().join().await;
        assert_eq!(outcomes, [Outcome::Failed]);
        assert_eq!(harness.router.stats().failures, 1);
    }
}
