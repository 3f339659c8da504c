//! Plugin definitions.
//!
//! A plugin is described once, at start-up, by a [`PluginFactory`]: a plain
//! function returning a [`PluginDefinition`]. The definition lists the
//! plugin's routes in declaration order, its user-facing docs and the default
//! values of its per-channel configuration.
//!
//! ```rust,ignore
//! pub fn plugin() -> PluginDefinition {
//!     PluginDefinition::new("ping")
//!         .docs("Answers to `{{ nick }}: ping`.")
//!         .on_mention("pong", r"ping$", pong)
//! }
//! ```

use botbot_core::PluginSettings;
use serde_json::Value;

use crate::handler::{BoxedHandler, IntoHandler};
use crate::route::RouteClass;

/// Builds a plugin definition. Called once per process by the registry.
pub type PluginFactory = fn() -> PluginDefinition;

/// A declared route before its pattern is compiled.
pub struct RouteSpec {
    pub class: RouteClass,
    /// Handler name, used in logs.
    pub name: &'static str,
    /// Pattern source; `None` for firehose routes.
    pub pattern: Option<String>,
    pub handler: BoxedHandler,
}

/// Static description of a plugin: slug, docs, config defaults and routes.
pub struct PluginDefinition {
    slug: String,
    docs: String,
    defaults: PluginSettings,
    routes: Vec<RouteSpec>,
}

impl PluginDefinition {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            docs: String::new(),
            defaults: PluginSettings::new(),
            routes: Vec::new(),
        }
    }

    /// Sets the user-facing documentation. `{{ nick }}` is replaced with the
    /// bot's nick when the docs are shown.
    pub fn docs(mut self, docs: impl Into<String>) -> Self {
        self.docs = docs.into();
        self
    }

    /// Declares a configuration key and its default value.
    pub fn default_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Adds a handler that sees every line of the channel.
    pub fn firehose(mut self, name: &'static str, handler: impl IntoHandler) -> Self {
        self.routes.push(RouteSpec {
            class: RouteClass::Firehose,
            name,
            pattern: None,
            handler: handler.into_handler(),
        });
        self
    }

    /// Adds a handler for chat messages whose text matches `pattern`.
    pub fn on_message(
        self,
        name: &'static str,
        pattern: impl Into<String>,
        handler: impl IntoHandler,
    ) -> Self {
        self.route(RouteClass::Message, name, pattern, handler)
    }

    /// Adds a handler for messages addressed to the bot whose stripped text
    /// matches `pattern`.
    pub fn on_mention(
        self,
        name: &'static str,
        pattern: impl Into<String>,
        handler: impl IntoHandler,
    ) -> Self {
        self.route(RouteClass::Mention, name, pattern, handler)
    }

    fn route(
        mut self,
        class: RouteClass,
        name: &'static str,
        pattern: impl Into<String>,
        handler: impl IntoHandler,
    ) -> Self {
        self.routes.push(RouteSpec {
            class,
            name,
            pattern: Some(pattern.into()),
            handler: handler.into_handler(),
        });
        self
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn user_docs(&self) -> &str {
        &self.docs
    }

    pub fn defaults(&self) -> &PluginSettings {
        &self.defaults
    }

    pub fn routes(&self) -> &[RouteSpec] {
        &self.routes
    }

    pub(crate) fn into_parts(self) -> (String, String, PluginSettings, Vec<RouteSpec>) {
        (self.slug, self.docs, self.defaults, self.routes)
    }
}

impl std::fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("slug", &self.slug)
            .field("routes", &self.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Invocation;
    use tower::BoxError;

    async fn noop(_: Invocation) -> Result<(), BoxError> {
        Ok(())
    }

    #[test]
    fn test_routes_keep_declaration_order() {
        let plugin = PluginDefinition::new("demo")
            .docs("Demo plugin")
            .default_config("limit", 3)
            .on_mention("second", "b", noop)
            .firehose("first", noop)
            .on_message("third", "c", noop);

        let names: Vec<_> = plugin.routes().iter().map(|r| r.name).collect();
        assert_eq!(names, ["second", "first", "third"]);
        assert_eq!(plugin.routes()[1].pattern, None);
        assert_eq!(plugin.defaults().get("limit"), Some(&Value::from(3)));
        assert_eq!(plugin.user_docs(), "Demo plugin");
    }
}
