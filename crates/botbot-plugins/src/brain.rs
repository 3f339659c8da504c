//! `brain`: remembers short facts per channel.
//!
//! ```text
//! botbot: remember deploy = every tuesday
//! botbot: deploy?
//! botbot: forget deploy
//! ```
//!
//! Keys are case-insensitive. The `max_keys` configuration value caps how many
//! facts a channel can hold.

use botbot_framework::{BoxError, Invocation, PluginContext, PluginDefinition, StorageResult};
use tracing::debug;

pub const SLUG: &str = "brain";
pub const DEFAULT_MAX_KEYS: u64 = 100;

const INDEX_KEY: &str = "index";

pub fn plugin() -> PluginDefinition {
    PluginDefinition::new(SLUG)
        .docs(
            "Remembers things for you.\n\n    \
             {{ nick }}: remember <key> = <value>\n    \
             {{ nick }}: <key>?\n    \
             {{ nick }}: forget <key>",
        )
        .default_config("max_keys", DEFAULT_MAX_KEYS)
        .on_mention("remember", r"remember (?P<key>[^=]+?)\s*=\s*(?P<value>.+)", remember)
        .on_mention("forget", r"forget (?P<key>[^?]+)\??$", forget)
        .on_mention("recall", r"(?P<key>[^=?]+)\?$", recall)
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}

fn fact_key(key: &str) -> String {
    format!("fact:{key}")
}

async fn load_index(ctx: &PluginContext) -> StorageResult<Vec<String>> {
    Ok(ctx
        .storage()
        .retrieve_json::<Vec<String>>(INDEX_KEY)
        .await?
        .unwrap_or_default())
}

async fn remember(inv: Invocation) -> Result<String, BoxError> {
    let key = normalize(inv.arg("key").unwrap_or_default());
    let value = inv.arg("value").unwrap_or_default().trim();
    if key.is_empty() || value.is_empty() {
        return Ok(String::new());
    }

    let ctx = &inv.ctx;
    let mut index = load_index(ctx).await?;
    if !index.contains(&key) {
        let max_keys = ctx
            .config_value("max_keys")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_MAX_KEYS);
        if index.len() as u64 >= max_keys {
            return Ok(format!("Sorry {}, my brain is full.", inv.line.user()));
        }
        index.push(key.clone());
        ctx.storage().store_json(INDEX_KEY, &index).await?;
    }

    ctx.store(&fact_key(&key), value).await?;
    debug!(plugin = SLUG, key = %key, "Fact stored");
    Ok(format!("I will remember \"{key}\" for you, {}.", inv.line.user()))
}

async fn recall(inv: Invocation) -> Result<Option<String>, BoxError> {
    let key = normalize(inv.arg("key").unwrap_or_default());
    // `forget <key>?` belongs to the forget route.
    if key.starts_with("forget ") {
        return Ok(None);
    }
    Ok(inv.ctx.retrieve(&fact_key(&key)).await?)
}

async fn forget(inv: Invocation) -> Result<String, BoxError> {
    let key = normalize(inv.arg("key").unwrap_or_default());
    let ctx = &inv.ctx;

    if !ctx.delete(&fact_key(&key)).await? {
        return Ok(format!("I don't know anything about \"{key}\"."));
    }

    let mut index = load_index(ctx).await?;
    index.retain(|known| *known != key);
    ctx.storage().store_json(INDEX_KEY, &index).await?;
    Ok(format!("I forgot \"{key}\"."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use botbot_core::PluginSettings;
    use botbot_framework::testing::Harness;

    async fn say(harness: &Harness, text: &str) -> Vec<String> {
        harness
            .handle(&Harness::privmsg(&format!("botbot: {text}"), "#test"))
            .await;
        harness.outbound.drain()
    }

    #[tokio::test]
    async fn test_remember_recall_forget() {
        let harness = Harness::new(&[plugin], &[SLUG]);

        assert_eq!(
            say(&harness, "remember Deploy = every tuesday").await,
            ["WRITE 1 #test I will remember \"deploy\" for you, alice."]
        );
        assert_eq!(
            say(&harness, "DEPLOY?").await,
            ["WRITE 1 #test every tuesday"]
        );
        assert_eq!(
            say(&harness, "forget deploy").await,
            ["WRITE 1 #test I forgot \"deploy\"."]
        );
        assert!(say(&harness, "deploy?").await.is_empty());
        assert_eq!(
            say(&harness, "forget deploy").await,
            ["WRITE 1 #test I don't know anything about \"deploy\"."]
        );
    }

    #[tokio::test]
    async fn test_facts_are_namespaced() {
        let harness = Harness::new(&[plugin], &[SLUG]);
        say(&harness, "remember x = 1").await;
        assert_eq!(
            harness.kv.keys(),
            ["1:10:brain:fact:x", "1:10:brain:index"]
        );
    }

    #[tokio::test]
    async fn test_max_keys_from_config() {
        let mut settings = PluginSettings::new();
        settings.insert("max_keys".into(), 1.into());
        let harness = Harness::builder(&[plugin], &[]).config(SLUG, settings).build();

        say(&harness, "remember a = 1").await;
        assert_eq!(
            say(&harness, "remember b = 2").await,
            ["WRITE 1 #test Sorry alice, my brain is full."]
        );
        // Overwriting a known key is still allowed.
        assert_eq!(say(&harness, "remember a = 3").await.len(), 1);
        assert_eq!(say(&harness, "a?").await, ["WRITE 1 #test 3"]);
    }

    #[tokio::test]
    async fn test_forget_with_question_mark_replies_once() {
        let harness = Harness::new(&[plugin], &[SLUG]);
        say(&harness, "remember deploy = every tuesday").await;
        say(&harness, "remember forget deploy = never").await;

        assert_eq!(
            say(&harness, "forget deploy?").await,
            ["WRITE 1 #test I forgot \"deploy\"."]
        );
        assert!(say(&harness, "deploy?").await.is_empty());
    }
}
