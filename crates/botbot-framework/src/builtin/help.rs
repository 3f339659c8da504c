//! Built-in `help` plugin.
//!
//! ```text
//! botbot: help          -> Available plugins: help, logger (https://botbot.me/freenode/test/help/)
//! botbot: help logger   -> Logs all activity.
//!                          More details: https://botbot.me/freenode/test/help/#logger
//! ```
//!
//! The site root comes from the `site` configuration key.

use botbot_core::Channel;
use tower::BoxError;

use crate::context::PluginContext;
use crate::handler::Invocation;
use crate::plugin::PluginDefinition;

pub const SLUG: &str = "help";
pub const DEFAULT_SITE: &str = "https://botbot.me";

const DOCS: &str = "Shows available plugins and descriptions.

Simply ask for help and I'll gladly tell you what I'm capable of:

    {{ nick }}: help

For further details, you can ask me about a specific plugin:

    {{ nick }}: help images";

pub fn plugin() -> PluginDefinition {
    PluginDefinition::new(SLUG)
        .docs(DOCS)
        .default_config("site", DEFAULT_SITE)
        .on_mention("respond_to_help", r"help$", respond_to_help)
        .on_mention(
            "respond_to_plugin_help",
            r"help (?P<command>.*)",
            respond_to_plugin_help,
        )
}

/// Path of a channel's help page under the site root.
pub fn help_path(bot_slug: &str, channel: &Channel) -> String {
    if channel.is_public {
        format!("/{bot_slug}/{}/help/", channel.url_slug())
    } else {
        format!("/private/{}/help/", channel.url_slug())
    }
}

fn help_url(ctx: &PluginContext) -> String {
    let site = ctx
        .config_str("site")
        .unwrap_or(DEFAULT_SITE)
        .trim_end_matches('/');
    match ctx.channel() {
        Some(channel) => format!("{site}{}", help_path(&ctx.chatbot().slug(), channel)),
        None => format!("{site}/"),
    }
}

async fn respond_to_help(inv: Invocation) -> Result<String, BoxError> {
    let plugins: Vec<&str> = inv.ctx.active_plugins().iter().map(String::as_str).collect();
    Ok(format!(
        "Available plugins: {} ({})",
        plugins.join(", "),
        help_url(&inv.ctx)
    ))
}

async fn respond_to_plugin_help(inv: Invocation) -> Result<String, BoxError> {
    let command = inv.arg("command").unwrap_or_default();
    let slug = command.trim();

    let docs = inv
        .ctx
        .active_plugins()
        .contains(slug)
        .then(|| inv.ctx.plugin_docs(slug))
        .flatten();

    let Some(docs) = docs else {
        return Ok("Sorry, that plugin is not available.".to_string());
    };

    let summary = docs.trim().lines().next().unwrap_or_default();
    Ok(format!(
        "{summary}\nMore details: {}#{command}",
        help_url(&inv.ctx)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::BUILTIN_PLUGINS;
    use crate::dispatcher::Outcome;
    use crate::testing::Harness;
    use botbot_core::{ChannelId, ChatBotId, PluginSettings};

    #[tokio::test]
    async fn test_help_lists_active_plugins_only() {
        let harness = Harness::new(BUILTIN_PLUGINS, &["help"]);
        let outcomes = harness
            .handle(&Harness::privmsg("botbot: help", "#test"))
            .await;

        assert_eq!(outcomes, [Outcome::Replied(1)]);
        assert_eq!(
            harness.outbound.drain(),
            ["WRITE 1 #test Available plugins: help (https://botbot.me/freenode/test/help/)"]
        );
        assert!(harness.store.logs().is_empty());
    }

    #[tokio::test]
    async fn test_plugin_help_shows_first_docs_line() {
        let harness = Harness::new(BUILTIN_PLUGINS, &["help", "logger"]);
        harness
            .handle(&Harness::privmsg("botbot: help logger", "#test"))
            .await;

        assert_eq!(
            harness.outbound.drain(),
            [
                "WRITE 1 #test Logs all activity.",
                "WRITE 1 #test More details: https://botbot.me/freenode/test/help/#logger",
            ]
        );
    }

    #[tokio::test]
    async fn test_plugin_help_for_inactive_plugin() {
        let harness = Harness::new(BUILTIN_PLUGINS, &["help"]);
        harness
            .handle(&Harness::privmsg("botbot: help logger", "#test"))
            .await;
        assert_eq!(
            harness.outbound.drain(),
            ["WRITE 1 #test Sorry, that plugin is not available."]
        );
    }

    #[tokio::test]
    async fn test_site_comes_from_channel_config() {
        let mut settings = PluginSettings::new();
        settings.insert("site".into(), "https://logs.example.org/".into());
        let harness = Harness::builder(BUILTIN_PLUGINS, &[])
            .config("help", settings)
            .build();
        harness
            .handle(&Harness::privmsg("botbot: HELP", "#test"))
            .await;
        assert_eq!(
            harness.outbound.drain(),
            ["WRITE 1 #test Available plugins: help (https://logs.example.org/freenode/test/help/)"]
        );
    }

    #[test]
    fn test_private_channel_path() {
        let channel = Channel {
            id: ChannelId(3),
            chatbot_id: ChatBotId(1),
            name: "#secret".into(),
            slug: None,
            is_public: false,
        };
        assert_eq!(help_path("freenode", &channel), "/private/secret/help/");
    }
}
