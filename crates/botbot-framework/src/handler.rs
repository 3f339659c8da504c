//! Plugin handlers as tower services.
//!
//! Every route stores a [`BoxedHandler`]: a cloneable, type-erased
//! `tower::Service<Invocation>`. Plugin authors normally write a plain async
//! function taking an [`Invocation`] and let [`IntoHandler`] wrap it:
//!
//! ```rust,ignore
//! async fn ping(_: Invocation) -> Result<&'static str, BoxError> {
//!     Ok("pong")
//! }
//! ```
//!
//! Errors and panics are contained by the router; a failing handler simply
//! produces no reply.

use std::future::Future;
use std::sync::Arc;

use botbot_core::Line;
use tower::BoxError;
use tower::util::{BoxCloneSyncService, service_fn};

use crate::context::PluginContext;
use crate::route::RouteArgs;

/// One matched handler call: a fresh context, the line and its captures.
#[derive(Clone)]
pub struct Invocation {
    pub ctx: PluginContext,
    pub line: Arc<Line>,
    pub args: RouteArgs,
}

impl Invocation {
    /// Shorthand for a named capture group.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name)
    }
}

// ============================================================================
// Reply
// ============================================================================

/// Text a handler wants sent back to IRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// To the line's effective channel.
    Channel(String),
    /// Privately to the sender of the line.
    Private(String),
}

impl Reply {
    pub fn private(text: impl Into<String>) -> Self {
        Self::Private(text.into())
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Channel(text) | Self::Private(text) => text,
        }
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Channel(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::Channel(text.to_string())
    }
}

/// Values a handler may return.
pub trait IntoReply: Send + 'static {
    fn into_reply(self) -> Option<Reply>;
}

impl IntoReply for () {
    fn into_reply(self) -> Option<Reply> {
        None
    }
}

impl IntoReply for Reply {
    fn into_reply(self) -> Option<Reply> {
        (!self.text().is_empty()).then_some(self)
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Option<Reply> {
        Reply::Channel(self).into_reply()
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Option<Reply> {
        Reply::from(self).into_reply()
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Option<Reply> {
        self.and_then(IntoReply::into_reply)
    }
}

// ============================================================================
// BoxedHandler
// ============================================================================

/// The type-erased handler stored in the registry.
pub type BoxedHandler = BoxCloneSyncService<Invocation, Option<Reply>, BoxError>;

/// Conversion of async functions into [`BoxedHandler`]s.
pub trait IntoHandler {
    fn into_handler(self) -> BoxedHandler;
}

impl<F, Fut, R> IntoHandler for F
where
    F: Fn(Invocation) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: IntoReply,
{
    fn into_handler(self) -> BoxedHandler {
        BoxCloneSyncService::new(service_fn(move |invocation: Invocation| {
            let fut = (self)(invocation);
            async move { fut.await.map(IntoReply::into_reply) }
        }))
    }
}
