//! Shared cancellation and "handled" state for one chain.

use super::CancellationToken;
use crate::config::ChainConfig;
use crate::errors::{ChainError, Result};
use crate::events::{self, EventSink, NoOpEventSink};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

struct ScopeState {
    run_id: Uuid,
    token: CancellationToken,
    handled: AtomicBool,
    released: AtomicBool,
    next_node: AtomicUsize,
    config: ChainConfig,
    sink: Arc<dyn EventSink>,
}

/// The context shared by every node of one chain.
///
/// A scope owns the chain's cancellation token (optionally linked to a
/// parent token) and the latched "handled" flag used by handler nodes.
/// Clones are cheap handles to the same state.
///
/// Releasing a scope is explicit and independent of chain completion:
/// after [`release`](Self::release), cancelling fails with
/// [`ChainError::ScopeReleased`] and nodes refuse to start.
#[derive(Clone)]
pub struct ChainScope {
    inner: Arc<ScopeState>,
}

impl ChainScope {
    /// Creates a standalone scope with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a scope whose token is cancelled whenever `parent` is.
    #[must_use]
    pub fn linked(parent: &CancellationToken) -> Self {
        Self::builder().parent(parent.clone()).build()
    }

    /// Starts building a scope.
    #[must_use]
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::default()
    }

    /// Unique id of this chain run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// The scope's cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// The chain configuration.
    #[must_use]
    pub fn config(&self) -> &ChainConfig {
        &self.inner.config
    }

    /// The sink receiving this chain's events.
    #[must_use]
    pub fn sink(&self) -> &dyn EventSink {
        self.inner.sink.as_ref()
    }

    /// Cancels the chain. Listeners are notified before this returns.
    ///
    /// Repeat calls are no-ops. Fails if the scope was released.
    pub fn cancel(&self, reason: impl Into<String>) -> Result<()> {
        self.ensure_live()?;
        let reason = reason.into();
        if self.inner.token.cancel(reason.clone()) {
            self.announce_cancel(&reason);
        }
        Ok(())
    }

    /// Cancels the chain without waiting for linked listeners.
    ///
    /// The scope reads as cancelled as soon as this returns. Awaiting the
    /// handle waits for propagation to linked tokens.
    pub fn cancel_async(&self, reason: impl Into<String>) -> Result<JoinHandle<()>> {
        self.ensure_live()?;
        let reason = reason.into();
        match self.inner.token.try_cancel_async(reason.clone()) {
            Some(propagation) => {
                self.announce_cancel(&reason);
                Ok(propagation)
            }
            None => Ok(self.inner.token.cancel_async(reason)),
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// The reason given when the scope was cancelled.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<String> {
        self.inner.token.reason()
    }

    /// Fails with [`ChainError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        self.ensure_live()?;
        if self.is_cancelled() {
            return Err(ChainError::cancelled(self.cancel_reason()));
        }
        Ok(())
    }

    /// Completes once the scope is cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// Marks the chain handled.
    ///
    /// Returns true only for the call that flipped the flag.
    pub fn mark_handled(&self) -> bool {
        let flipped = self
            .inner
            .handled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if flipped {
            debug!(run_id = %self.inner.run_id, "Chain marked handled");
            self.emit(
                events::SCOPE_HANDLED,
                serde_json::json!({ "run_id": self.inner.run_id.to_string() }),
            );
        }
        flipped
    }

    /// Returns whether a handler has marked the chain handled.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.inner.handled.load(Ordering::SeqCst)
    }

    /// Releases the scope. Later cancellation attempts and node starts fail.
    ///
    /// A scope linked to a parent token also drops its registration with
    /// the parent, so the parent no longer cancels it.
    pub fn release(&self) {
        if !self.inner.released.swap(true, Ordering::SeqCst) {
            self.inner.token.unlink();
            debug!(run_id = %self.inner.run_id, "Chain scope released");
            self.emit(
                events::SCOPE_RELEASED,
                serde_json::json!({ "run_id": self.inner.run_id.to_string() }),
            );
        }
    }

    /// Returns whether the scope was released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    pub(crate) fn next_node_index(&self) -> usize {
        self.inner.next_node.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event_type: &str, data: serde_json::Value) {
        if self.inner.config.emit_events {
            self.inner.sink.try_emit(event_type, Some(data));
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(ChainError::ScopeReleased);
        }
        Ok(())
    }

    fn announce_cancel(&self, reason: &str) {
        info!(run_id = %self.inner.run_id, chain = %self.inner.config.name, reason = %reason, "Chain cancelled");
        self.emit(
            events::SCOPE_CANCELLED,
            serde_json::json!({
                "run_id": self.inner.run_id.to_string(),
                "reason": reason,
                "timestamp": events::event_timestamp(),
            }),
        );
    }
}

impl Default for ChainScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChainScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainScope")
            .field("run_id", &self.inner.run_id)
            .field("name", &self.inner.config.name)
            .field("cancelled", &self.is_cancelled())
            .field("handled", &self.is_handled())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Builder for [`ChainScope`].
#[derive(Default)]
pub struct ScopeBuilder {
    parent: Option<CancellationToken>,
    config: Option<ChainConfig>,
    sink: Option<Arc<dyn EventSink>>,
}

impl ScopeBuilder {
    /// Links the scope's token to a parent token.
    #[must_use]
    pub fn parent(mut self, token: CancellationToken) -> Self {
        self.parent = Some(token);
        self
    }

    /// Sets the chain configuration.
    #[must_use]
    pub fn config(mut self, config: ChainConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Builds the scope.
    #[must_use]
    pub fn build(self) -> ChainScope {
        let token = self
            .parent
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);

        ChainScope {
            inner: Arc::new(ScopeState {
                run_id: Uuid::new_v4(),
                token,
                handled: AtomicBool::new(false),
                released: AtomicBool::new(false),
                next_node: AtomicUsize::new(0),
                config: self.config.unwrap_or_default(),
                sink: self.sink.unwrap_or_else(|| Arc::new(NoOpEventSink)),
            }),
        }
    }
}

impl std::fmt::Debug for ScopeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeBuilder")
            .field("parent", &self.parent)
            .field("config", &self.config)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
