//! `last_seen`: remembers when each nick was last active in a channel.

use botbot_core::Command;
use botbot_framework::{BoxError, Invocation, PluginDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SLUG: &str = "last_seen";

pub fn plugin() -> PluginDefinition {
    PluginDefinition::new(SLUG)
        .docs("Tells you when somebody was last active here.\n\n    {{ nick }}: seen <nick>")
        .firehose("record", record)
        .on_mention("seen", r"seen (?P<nick>\S+)", seen)
}

#[derive(Debug, Serialize, Deserialize)]
struct Sighting {
    at: DateTime<Utc>,
    command: String,
    text: String,
}

fn nick_key(nick: &str) -> String {
    format!("nick:{}", nick.to_lowercase())
}

async fn record(inv: Invocation) -> Result<(), BoxError> {
    let line = &inv.line;
    if line.user().is_empty() {
        return Ok(());
    }
    let sighting = Sighting {
        at: line.received(),
        command: line.command().to_string(),
        text: line.full_text().to_string(),
    };
    inv.ctx
        .storage()
        .store_json(&nick_key(line.user()), &sighting)
        .await?;
    Ok(())
}

async fn seen(inv: Invocation) -> Result<String, BoxError> {
    let nick = inv.arg("nick").unwrap_or_default();
    if nick.eq_ignore_ascii_case(inv.line.user()) {
        return Ok(format!("{nick}, you are right here."));
    }

    let sighting: Option<Sighting> = inv.ctx.storage().retrieve_json(&nick_key(nick)).await?;
    let Some(sighting) = sighting else {
        return Ok(format!("I haven't seen {nick} here."));
    };

    let when = sighting.at.format("%Y-%m-%d %H:%M UTC");
    Ok(if Command::from(sighting.command.clone()).is_message() {
        format!("{nick} was last seen on {when} saying: {}", sighting.text)
    } else {
        format!("{nick} was last seen on {when} ({})", sighting.command)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use botbot_framework::testing::Harness;

    fn from(user: &str, command: &str, content: &str) -> String {
        Harness::packet(command, content, "#test").replace("\"alice\"", &format!("\"{user}\""))
    }

    #[tokio::test]
    async fn test_seen_after_message() {
        let harness = Harness::new(&[plugin], &[SLUG]);
        harness.handle(&from("bob", "PRIVMSG", "lunch?")).await;

        harness
            .handle(&Harness::privmsg("botbot: seen Bob", "#test"))
            .await;
        assert_eq!(
            harness.outbound.drain(),
            ["WRITE 1 #test Bob was last seen on 2020-01-01 00:00 UTC saying: lunch?"]
        );
    }

    #[tokio::test]
    async fn test_seen_after_join() {
        let harness = Harness::new(&[plugin], &[SLUG]);
        harness.handle(&from("carol", "JOIN", "")).await;
        harness
            .handle(&Harness::privmsg("botbot: seen carol", "#test"))
            .await;
        assert_eq!(
            harness.outbound.drain(),
            ["WRITE 1 #test carol was last seen on 2020-01-01 00:00 UTC (JOIN)"]
        );
    }

    #[tokio::test]
    async fn test_unknown_and_self() {
        let harness = Harness::new(&[plugin], &[SLUG]);
        harness
            .handle(&Harness::privmsg("botbot: seen dave", "#test"))
            .await;
        harness
            .handle(&Harness::privmsg("botbot: seen alice", "#test"))
            .await;
        assert_eq!(
            harness.outbound.drain(),
            [
                "WRITE 1 #test I haven't seen dave here.",
                "WRITE 1 #test alice, you are right here."
            ]
        );
    }
}
