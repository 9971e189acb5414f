//! Deferred pipeline values and the node chaining engine.
//!
//! A [`Chain<T>`] is a not-yet-awaited computation of a `T` bound to a
//! [`ChainScope`]. Appending a node consumes the chain and returns a new one
//! whose computation runs the node after the previous computation completes.
//! Await the final chain to get the result:
//!
//! ```rust,ignore
//! let total = Chain::new(order)
//!     .then(|order| order.lines.iter().map(|l| l.price).sum::<u64>())
//!     .then(|subtotal| subtotal * 112 / 100)
//!     .await?;
//! ```
//!
//! Every node checks the scope for cancellation before its body starts. A
//! failure in any node skips all later nodes and surfaces from the await.

mod context;
mod node;
mod value;

pub use context::{HandlerOutcome, NodeContext, NodeKind};

use crate::cancellation::{CancellationToken, ChainScope};
use crate::config::ChainConfig;
use crate::errors::{ChainError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::{Future, IntoFuture};

/// A deferred pipeline value.
///
/// Chains are lazy: nothing runs until the chain is awaited or
/// [`spawn`](Self::spawn)ed onto the runtime.
#[must_use = "chains do nothing unless awaited or spawned"]
pub struct Chain<T> {
    scope: ChainScope,
    future: BoxFuture<'static, Result<T>>,
    next_token: Option<CancellationToken>,
}

impl<T: Send + 'static> Chain<T> {
    /// Wraps a value in a chain with a fresh scope.
    pub fn new(value: T) -> Self {
        Self::with_scope(value, ChainScope::new())
    }

    /// Wraps a value in a chain whose scope is cancelled when `parent` is.
    pub fn linked(value: T, parent: &CancellationToken) -> Self {
        Self::with_scope(value, ChainScope::linked(parent))
    }

    /// Wraps a value in a chain with a fresh scope using `config`.
    pub fn with_config(value: T, config: ChainConfig) -> Self {
        Self::with_scope(value, ChainScope::builder().config(config).build())
    }

    /// Wraps a value in a chain bound to an existing scope.
    pub fn with_scope(value: T, scope: ChainScope) -> Self {
        Self::from_parts(scope, futures::future::ready(Ok(value)))
    }

    /// Starts a chain from a computation that produces the source value.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::from_future_with_scope(future, ChainScope::new())
    }

    /// Starts a chain from a computation, bound to an existing scope.
    pub fn from_future_with_scope<F>(future: F, scope: ChainScope) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::from_parts(scope, future.map(|r| r.map_err(ChainError::from_step)))
    }

    pub(crate) fn from_parts<F>(scope: ChainScope, future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            scope,
            future: future.boxed(),
            next_token: None,
        }
    }

    /// The scope shared by every node of this chain.
    pub fn scope(&self) -> &ChainScope {
        &self.scope
    }

    /// Binds an explicit cancellation token to the next appended node.
    ///
    /// That node checks both the scope and `token` before starting (and
    /// before each element for sequence nodes), and its body sees `token`
    /// through [`NodeContext::token`].
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.next_token = Some(token);
        self
    }

    /// Submits the computation to the tokio runtime now.
    ///
    /// The returned chain observes the spawned task; nodes appended to it run
    /// after the spawned work completes. Must be called within a runtime.
    pub fn spawn(self) -> Self {
        let Self {
            scope,
            future,
            next_token,
        } = self;
        let handle = tokio::spawn(future);
        let mut spawned = Self::from_parts(scope, async move {
            handle.await.map_err(|e| ChainError::from_join(&e))?
        });
        spawned.next_token = next_token;
        spawned
    }
}

impl<T: Send + 'static> IntoFuture for Chain<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl<T> fmt::Debug for Chain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("scope", &self.scope)
            .field("value_type", &std::any::type_name::<T>())
            .field("has_token", &self.next_token.is_some())
            .finish()
    }
}
