//! Value, side-effect and handler nodes.
//!
//! Each node kind has one canonical, async, context-aware method
//! (`*_async_with`); the other shapes are thin wrappers over it.

use super::node::emit_node_event;
use super::{Chain, HandlerOutcome, NodeContext, NodeKind};
use crate::errors::ChainError;
use crate::events;
use std::future::Future;
use tracing::debug;

impl<T: Send + 'static> Chain<T> {
    /// Appends an async transform that also receives the node context.
    pub fn then_async_with<U, F, Fut>(self, f: F) -> Chain<U>
    where
        U: Send + 'static,
        F: FnOnce(T, NodeContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
    {
        self.append(NodeKind::Value, move |value, ctx| async move {
            f(value, ctx).await.map_err(ChainError::from_step)
        })
    }

    /// Appends an async transform.
    pub fn then_async<U, F, Fut>(self, f: F) -> Chain<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
    {
        self.then_async_with(move |value, _| f(value))
    }

    /// Appends a fallible transform that receives the node context.
    pub fn then_with<U, F>(self, f: F) -> Chain<U>
    where
        U: Send + 'static,
        F: FnOnce(T, &NodeContext) -> anyhow::Result<U> + Send + 'static,
    {
        self.then_async_with(move |value, ctx| futures::future::ready(f(value, &ctx)))
    }

    /// Appends a fallible transform.
    pub fn try_then<U, F>(self, f: F) -> Chain<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
    {
        self.then_with(move |value, _| f(value))
    }

    /// Appends an infallible transform.
    pub fn then<U, F>(self, f: F) -> Chain<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then_with(move |value, _| Ok(f(value)))
    }

    /// Appends an async side effect that receives the node context.
    ///
    /// The value is consumed; the resulting chain yields `()`.
    pub fn effect_async_with<F, Fut>(self, f: F) -> Chain<()>
    where
        F: FnOnce(T, NodeContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.append(NodeKind::Effect, move |value, ctx| async move {
            f(value, ctx).await.map_err(ChainError::from_step)
        })
    }

    /// Appends an async side effect.
    pub fn effect_async<F, Fut>(self, f: F) -> Chain<()>
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.effect_async_with(move |value, _| f(value))
    }

    /// Appends a fallible side effect that receives the node context.
    pub fn effect_with<F>(self, f: F) -> Chain<()>
    where
        F: FnOnce(T, &NodeContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.effect_async_with(move |value, ctx| futures::future::ready(f(value, &ctx)))
    }

    /// Appends a fallible side effect.
    pub fn try_effect<F>(self, f: F) -> Chain<()>
    where
        F: FnOnce(T) -> anyhow::Result<()> + Send + 'static,
    {
        self.effect_with(move |value, _| f(value))
    }

    /// Appends an infallible side effect.
    pub fn effect<F>(self, f: F) -> Chain<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.effect_with(move |value, _| {
            f(value);
            Ok(())
        })
    }

    /// Appends an async handler.
    ///
    /// The body only runs while the chain is not yet handled. If it reports
    /// the value as handled, the scope's flag is latched and every later
    /// handler body is skipped. Value nodes keep running either way.
    pub fn handle_async_with<F, Fut>(self, f: F) -> Self
    where
        F: FnOnce(T, NodeContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<HandlerOutcome<T>>> + Send + 'static,
    {
        self.append(NodeKind::Handler, move |value, ctx| async move {
            if ctx.scope().is_handled() {
                debug!("Chain already handled, skipping handler");
                emit_node_event(&ctx, events::NODE_SKIPPED, serde_json::json!({}));
                return Ok(value);
            }

            let scope = ctx.scope().clone();
            let outcome = f(value, ctx).await.map_err(ChainError::from_step)?;
            if outcome.handled {
                scope.mark_handled();
            }
            Ok(outcome.value)
        })
    }

    /// Appends a fallible handler that may update the value in place.
    pub fn try_handle<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut T, &NodeContext) -> anyhow::Result<bool> + Send + 'static,
    {
        self.handle_async_with(move |mut value, ctx| {
            let outcome = f(&mut value, &ctx).map(|handled| HandlerOutcome::new(value, handled));
            futures::future::ready(outcome)
        })
    }

    /// Appends a handler that may update the value in place.
    pub fn handle<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut T) -> bool + Send + 'static,
    {
        self.try_handle(move |value, _| Ok(f(value)))
    }

    /// Appends a side effect that only runs while the chain is not handled.
    pub fn handle_effect<F>(self, f: F) -> Chain<()>
    where
        F: FnOnce(T) -> anyhow::Result<()> + Send + 'static,
    {
        self.append(NodeKind::Handler, move |value, ctx| async move {
            if ctx.scope().is_handled() {
                debug!("Chain already handled, skipping handler effect");
                emit_node_event(&ctx, events::NODE_SKIPPED, serde_json::json!({}));
                return Ok(());
            }
            f(value).map_err(ChainError::from_step)
        })
    }

    /// Fails with [`ChainError::NotHandled`] unless a handler marked the
    /// chain handled; otherwise passes the value through.
    pub fn fail_if_not_handled(self) -> Self {
        self.guard_handled(None)
    }

    /// Like [`fail_if_not_handled`](Self::fail_if_not_handled), attaching
    /// `message` to the error.
    pub fn fail_if_not_handled_with(self, message: impl Into<String>) -> Self {
        self.guard_handled(Some(message.into()))
    }

    fn guard_handled(self, message: Option<String>) -> Self {
        self.append(NodeKind::HandledGuard, move |value, ctx| async move {
            if ctx.scope().is_handled() {
                Ok(value)
            } else {
                Err(ChainError::not_handled(message))
            }
        })
    }
}
