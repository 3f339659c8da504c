//! The plugin registry.
//!
//! Built once at start-up from a list of [`PluginFactory`]s and read-only
//! afterwards. Routes are kept in three maps, one per [`RouteClass`], keyed by
//! plugin slug; within one plugin the declaration order is preserved.

use std::collections::{BTreeMap, HashMap};

use botbot_core::PluginSettings;
use regex::{Regex, RegexBuilder};
use tracing::{info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::handler::BoxedHandler;
use crate::plugin::{PluginDefinition, PluginFactory};
use crate::route::{RouteArgs, RouteClass};

// ============================================================================
// Route
// ============================================================================

/// A registered route with its compiled pattern.
#[derive(Clone)]
pub struct Route {
    plugin: String,
    name: &'static str,
    class: RouteClass,
    pattern: Option<Regex>,
    handler: BoxedHandler,
}

impl Route {
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn class(&self) -> RouteClass {
        self.class
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// Tests `text` against the pattern.
    ///
    /// Patterns are anchored at the start of the text only and case
    /// insensitive. Firehose routes match everything with no arguments.
    pub fn matches(&self, text: &str) -> Option<RouteArgs> {
        match &self.pattern {
            None => Some(RouteArgs::new()),
            Some(regex) => regex
                .captures(text)
                .map(|caps| RouteArgs::from_captures(regex, &caps)),
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("plugin", &self.plugin)
            .field("name", &self.name)
            .field("class", &self.class)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .finish()
    }
}

fn compile(slug: &str, name: &'static str, pattern: &str) -> RegistryResult<Regex> {
    RegexBuilder::new(&format!("^(?:{pattern})"))
        .case_insensitive(true)
        .build()
        .map_err(|source| RegistryError::InvalidPattern {
            slug: slug.to_string(),
            handler: name,
            source,
        })
}

// ============================================================================
// PluginRegistry
// ============================================================================

/// Docs and configuration defaults of a registered plugin.
#[derive(Debug, Clone, Default)]
pub struct PluginInfo {
    pub docs: String,
    pub defaults: PluginSettings,
}

/// All known plugins and their routes.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    firehose: HashMap<String, Vec<Route>>,
    messages: HashMap<String, Vec<Route>>,
    mentions: HashMap<String, Vec<Route>>,
    plugins: BTreeMap<String, PluginInfo>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from factories, in order.
    pub fn from_factories<'a>(
        factories: impl IntoIterator<Item = &'a PluginFactory>,
    ) -> RegistryResult<Self> {
        let mut registry = Self::new();
        registry.register_all(factories)?;
        Ok(registry)
    }

    pub fn register_all<'a>(
        &mut self,
        factories: impl IntoIterator<Item = &'a PluginFactory>,
    ) -> RegistryResult<()> {
        for factory in factories {
            self.register(factory())?;
        }
        Ok(())
    }

    /// Records every route of `definition`.
    ///
    /// All patterns are compiled before anything is recorded, so a failing
    /// plugin leaves the registry untouched. Registering a slug a second time
    /// replaces the earlier plugin entirely.
    pub fn register(&mut self, definition: PluginDefinition) -> RegistryResult<()> {
        let (slug, docs, defaults, specs) = definition.into_parts();

        let mut routes = Vec::with_capacity(specs.len());
        for spec in specs {
            let pattern = spec
                .pattern
                .as_deref()
                .map(|p| compile(&slug, spec.name, p))
                .transpose()?;
            routes.push(Route {
                plugin: slug.clone(),
                name: spec.name,
                class: spec.class,
                pattern,
                handler: spec.handler,
            });
        }

        if self.plugins.contains_key(&slug) {
            warn!(plugin = %slug, "Plugin registered twice, replacing earlier routes");
            for class in RouteClass::ALL {
                self.map_mut(class).remove(&slug);
            }
        }

        for route in routes {
            info!(
                plugin = %slug,
                handler = route.name,
                route = %route.class,
                pattern = route.pattern.as_ref().map_or("", Regex::as_str),
                "Route registered"
            );
            self.map_mut(route.class)
                .entry(slug.clone())
                .or_default()
                .push(route);
        }

        self.plugins.insert(slug, PluginInfo { docs, defaults });
        Ok(())
    }

    fn map_mut(&mut self, class: RouteClass) -> &mut HashMap<String, Vec<Route>> {
        match class {
            RouteClass::Firehose => &mut self.firehose,
            RouteClass::Message => &mut self.messages,
            RouteClass::Mention => &mut self.mentions,
        }
    }

    fn map(&self, class: RouteClass) -> &HashMap<String, Vec<Route>> {
        match class {
            RouteClass::Firehose => &self.firehose,
            RouteClass::Message => &self.messages,
            RouteClass::Mention => &self.mentions,
        }
    }

    /// Routes of `slug` in `class`, in declaration order.
    pub fn routes(&self, class: RouteClass, slug: &str) -> &[Route] {
        self.map(class).get(slug).map_or(&[], Vec::as_slice)
    }

    /// Whether `slug` has any route in `class`.
    pub fn has_routes(&self, class: RouteClass, slug: &str) -> bool {
        self.map(class).contains_key(slug)
    }

    pub fn plugin(&self, slug: &str) -> Option<&PluginInfo> {
        self.plugins.get(slug)
    }

    /// Every registered slug, sorted.
    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
