//! `ping`: answers `pong`.

use botbot_framework::{BoxError, Invocation, PluginDefinition};

pub const SLUG: &str = "ping";

pub fn plugin() -> PluginDefinition {
    PluginDefinition::new(SLUG)
        .docs("Checks that I am alive.\n\n    {{ nick }}: ping")
        .on_mention("pong", r"ping$", pong)
}

async fn pong(_: Invocation) -> Result<&'static str, BoxError> {
    Ok("pong")
}
