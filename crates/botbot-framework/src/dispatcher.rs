//! The router: turns one inbound line into concurrent handler invocations.
//!
//! For every line the router
//!
//! 1. looks up the plugins active in the line's channel,
//! 2. spawns every firehose route of those plugins,
//! 3. for chat messages, spawns every message route whose pattern matches,
//! 4. for messages addressed to the bot, does the same for mention routes.
//!
//! Each invocation runs in its own task with a fresh [`PluginContext`].
//! The router never waits for handlers: [`Router::dispatch`] returns as soon
//! as everything is spawned. Failures, panics and timeouts are logged and
//! counted at the invocation boundary and never reach the caller or sibling
//! handlers.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use botbot_core::{KvBackend, LogStore, MetadataStore, OutboundQueue};
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower::timeout::Timeout;
use tower::timeout::error::Elapsed;
use tower::{BoxError, ServiceExt};
use tracing::{debug, error, info};

use crate::context::{PluginContext, Services};
use crate::error::DispatchResult;
use crate::handler::{Invocation, Reply};
use crate::metadata::{Envelope, MetadataCache};
use crate::registry::{PluginRegistry, Route};
use crate::resolver::ActiveConfigResolver;
use crate::responder::Responder;
use crate::route::{RouteArgs, RouteClass};

// ============================================================================
// Outcome & statistics
// ============================================================================

/// How one handler invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Finished without anything to send.
    Silent,
    /// Finished and queued this many outbound lines.
    Replied(usize),
    /// Returned an error, panicked or could not be set up.
    Failed,
    /// Exceeded the handler timeout.
    TimedOut,
}

/// Counters kept by a router over its lifetime.
#[derive(Debug, Default)]
pub struct RouterStats {
    lines: AtomicU64,
    invocations: AtomicU64,
    replies: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
}

/// A point-in-time copy of [`RouterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lines: u64,
    pub invocations: u64,
    pub replies: u64,
    pub failures: u64,
    pub timeouts: u64,
}

impl RouterStats {
    fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Silent => {}
            Outcome::Replied(lines) => {
                self.replies.fetch_add(lines as u64, Ordering::Relaxed);
            }
            Outcome::Failed => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::TimedOut => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Dispatched
// ============================================================================

/// The invocations spawned for one line.
///
/// Dropping this detaches the tasks; they keep running.
#[derive(Debug, Default)]
pub struct Dispatched {
    handles: Vec<JoinHandle<Outcome>>,
}

impl Dispatched {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every invocation and returns their outcomes in spawn order.
    pub async fn join(self) -> Vec<Outcome> {
        join_all(self.handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or(Outcome::Failed))
            .collect()
    }
}

// ============================================================================
// Router
// ============================================================================

/// The external systems a router talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataStore>,
    pub logs: Arc<dyn LogStore>,
    pub kv: Arc<dyn KvBackend>,
    pub outbound: Arc<dyn OutboundQueue>,
}

/// Builder for [`Router`].
pub struct RouterBuilder {
    registry: Arc<PluginRegistry>,
    collaborators: Collaborators,
    handler_timeout: Option<Duration>,
    metadata_ttl: Option<Duration>,
    config_ttl: Option<Duration>,
}

impl RouterBuilder {
    /// Bounds every handler invocation. Unbounded by default.
    pub fn handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Lifetime of cached chatbot and channel records.
    pub fn metadata_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.metadata_ttl = ttl;
        self
    }

    /// Lifetime of cached activation sets and plugin configuration, on top
    /// of explicit invalidation.
    pub fn config_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.config_ttl = ttl;
        self
    }

    pub fn build(self) -> Router {
        let Collaborators {
            metadata,
            logs,
            kv,
            outbound,
        } = self.collaborators;

        let resolver = Arc::new(ActiveConfigResolver::new(
            Arc::clone(&metadata),
            self.config_ttl,
        ));
        let services = Arc::new(Services {
            registry: self.registry,
            resolver,
            kv,
            logs,
            responder: Responder::new(outbound),
        });

        Router {
            services,
            metadata: MetadataCache::new(metadata, self.metadata_ttl),
            tracker: TaskTracker::new(),
            stats: Arc::new(RouterStats::default()),
            handler_timeout: self.handler_timeout,
        }
    }
}

/// Routes inbound lines to plugin handlers.
pub struct Router {
    services: Arc<Services>,
    metadata: MetadataCache,
    tracker: TaskTracker,
    stats: Arc<RouterStats>,
    handler_timeout: Option<Duration>,
}

impl Router {
    pub fn builder(registry: Arc<PluginRegistry>, collaborators: Collaborators) -> RouterBuilder {
        RouterBuilder {
            registry,
            collaborators,
            handler_timeout: None,
            metadata_ttl: None,
            config_ttl: None,
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.services.registry
    }

    pub fn resolver(&self) -> &ActiveConfigResolver {
        &self.services.resolver
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of handler invocations still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Drops every cached record so the next lines re-read the stores.
    pub fn invalidate_all(&self) {
        self.metadata.invalidate_all();
        self.services.resolver.invalidate_all();
    }

    /// Parses `payload` and dispatches it.
    pub async fn handle(&self, payload: &str) -> DispatchResult<Dispatched> {
        let envelope = self.metadata.envelope(payload).await?;
        self.dispatch(&envelope).await
    }

    /// Spawns every handler that matches the line in `envelope`.
    ///
    /// Calling this twice with the same envelope spawns two independent sets
    /// of invocations.
    pub async fn dispatch(&self, envelope: &Envelope) -> DispatchResult<Dispatched> {
        self.stats.lines.fetch_add(1, Ordering::Relaxed);
        let line = &envelope.line;
        debug!(
            channel = %line.channel_name(),
            command = %line.command(),
            latency_ms = (Utc::now() - line.received()).num_milliseconds(),
            "Dispatching line"
        );

        let active = match line.channel() {
            Some(channel) => self.services.resolver.active_plugins(channel.id).await?,
            None => Arc::new(BTreeSet::new()),
        };

        let registry = &self.services.registry;
        let mut dispatched = Dispatched::default();

        for slug in active.iter() {
            for route in registry.routes(RouteClass::Firehose, slug) {
                let handle = self.spawn(route, envelope, &active, RouteArgs::new());
                dispatched.handles.push(handle);
            }
        }

        if line.is_message() {
            let classes: &[RouteClass] = if line.is_direct_message() {
                &[RouteClass::Message, RouteClass::Mention]
            } else {
                &[RouteClass::Message]
            };

            for &class in classes {
                for slug in active.iter() {
                    for route in registry.routes(class, slug) {
                        let Some(args) = route.matches(line.text()) else {
                            continue;
                        };
                        info!(
                            plugin = %slug,
                            handler = route.name(),
                            route = %class,
                            channel = %line.channel_name(),
                            "Route matched"
                        );
                        let handle = self.spawn(route, envelope, &active, args);
                        dispatched.handles.push(handle);
                    }
                }
            }
        }

        Ok(dispatched)
    }

    fn spawn(
        &self,
        route: &Route,
        envelope: &Envelope,
        active: &Arc<BTreeSet<String>>,
        args: RouteArgs,
    ) -> JoinHandle<Outcome> {
        self.stats.invocations.fetch_add(1, Ordering::Relaxed);

        let services = Arc::clone(&self.services);
        let stats = Arc::clone(&self.stats);
        let route = route.clone();
        let envelope = envelope.clone();
        let active = Arc::clone(active);
        let timeout = self.handler_timeout;

        self.tracker.spawn(async move {
            let outcome = invoke(&services, &route, &envelope, active, args, timeout).await;
            stats.record(outcome);
            outcome
        })
    }

    /// Stops accepting new invocations and waits up to `timeout` for the
    /// running ones. Returns `false` if some were still running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            error!(in_flight = self.tracker.len(), "Handlers still running after drain timeout");
        }
        drained
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("plugins", &self.services.registry.len())
            .field("in_flight", &self.tracker.len())
            .field("handler_timeout", &self.handler_timeout)
            .finish()
    }
}

// ============================================================================
// Invocation
// ============================================================================

async fn invoke(
    services: &Arc<Services>,
    route: &Route,
    envelope: &Envelope,
    active: Arc<BTreeSet<String>>,
    args: RouteArgs,
    timeout: Option<Duration>,
) -> Outcome {
    let line = &envelope.line;
    let fail = |reason: &dyn std::fmt::Display, message: &'static str| {
        error!(
            plugin = %route.plugin(),
            handler = route.name(),
            route = %route.class(),
            channel = %line.channel_name(),
            line = %line,
            error = %reason,
            "{message}"
        );
    };

    let ctx = match PluginContext::resolve(services, route.plugin(), envelope, active).await {
        Ok(ctx) => ctx,
        Err(e) => {
            fail(&e, "Plugin context could not be built");
            return Outcome::Failed;
        }
    };

    let invocation = Invocation {
        ctx,
        line: Arc::clone(line),
        args,
    };
    let handler = route.handler().clone();
    let call: BoxFuture<'static, Result<Option<Reply>, BoxError>> = match timeout {
        Some(limit) => Box::pin(Timeout::new(handler, limit).oneshot(invocation)),
        None => Box::pin(handler.oneshot(invocation)),
    };

    let reply = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) if e.is::<Elapsed>() => {
            fail(&e, "Plugin handler timed out");
            return Outcome::TimedOut;
        }
        Ok(Err(e)) => {
            fail(&e, "Plugin handler failed");
            return Outcome::Failed;
        }
        Err(panic) => {
            fail(&panic_message(panic.as_ref()), "Plugin handler panicked");
            return Outcome::Failed;
        }
    };

    let Some(reply) = reply.filter(|_| route.class().replies()) else {
        return Outcome::Silent;
    };

    let (target, text) = match &reply {
        Reply::Channel(text) => (line.channel_name(), text),
        Reply::Private(text) => (line.user(), text),
    };
    match services
        .responder
        .respond(line.chatbot_id(), target, text)
        .await
    {
        Ok(0) => Outcome::Silent,
        Ok(sent) => Outcome::Replied(sent),
        Err(e) => {
            fail(&e, "Plugin reply could not be queued");
            Outcome::Failed
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
