//! What a node body sees while it runs.

use crate::cancellation::{CancellationToken, ChainScope};
use crate::errors::{ChainError, Result};
use std::fmt;

/// The kind of a node, used in log spans and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Transforms the value.
    Value,
    /// Consumes the value for its side effects.
    Effect,
    /// Chain-of-responsibility handler.
    Handler,
    /// Fails unless a handler marked the chain handled.
    HandledGuard,
    /// Transforms every element of a sequence.
    Map,
    /// Consumes every element of a sequence for its side effects.
    ForEach,
    /// Groups sequence elements into fixed-size chunks.
    Chunk,
    /// Converts between sequence shapes.
    Adapter,
}

impl NodeKind {
    /// Stable label for the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Effect => "effect",
            Self::Handler => "handler",
            Self::HandledGuard => "handled_guard",
            Self::Map => "map",
            Self::ForEach => "for_each",
            Self::Chunk => "chunk",
            Self::Adapter => "adapter",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context handed to every node body.
///
/// Carries the chain's scope and the node's effective token: the token bound
/// with [`Chain::with_token`](crate::chain::Chain::with_token), or the scope's
/// own token when none was bound.
#[derive(Debug, Clone)]
pub struct NodeContext {
    scope: ChainScope,
    token: CancellationToken,
    index: usize,
    kind: NodeKind,
}

impl NodeContext {
    pub(crate) fn new(
        scope: ChainScope,
        token: Option<CancellationToken>,
        index: usize,
        kind: NodeKind,
    ) -> Self {
        let token = token.unwrap_or_else(|| scope.token().clone());
        Self {
            scope,
            token,
            index,
            kind,
        }
    }

    /// The chain's scope.
    #[must_use]
    pub fn scope(&self) -> &ChainScope {
        &self.scope
    }

    /// The node's effective cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Position of this node in its chain, starting at 0.
    #[must_use]
    pub fn node_index(&self) -> usize {
        self.index
    }

    /// The node's kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns whether the scope or the node's token is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled() || self.token.is_cancelled()
    }

    /// Fails with [`ChainError::Cancelled`] if the scope or the node's token
    /// is cancelled.
    pub fn check(&self) -> Result<()> {
        self.scope.check()?;
        if self.token.is_cancelled() {
            return Err(ChainError::cancelled(self.token.reason()));
        }
        Ok(())
    }

    /// Cancels the whole chain from inside a node.
    pub fn cancel(&self, reason: impl Into<String>) -> Result<()> {
        self.scope.cancel(reason)
    }
}

/// What a handler body returns: the value to pass on and whether it handled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome<T> {
    /// The value passed to the next node.
    pub value: T,
    /// Whether this handler handled the value.
    pub handled: bool,
}

impl<T> HandlerOutcome<T> {
    /// The handler took responsibility for the value.
    #[must_use]
    pub fn handled(value: T) -> Self {
        Self {
            value,
            handled: true,
        }
    }

    /// The handler declined; later handlers still run.
    #[must_use]
    pub fn declined(value: T) -> Self {
        Self {
            value,
            handled: false,
        }
    }

    /// Builds an outcome from a flag.
    #[must_use]
    pub fn new(value: T, handled: bool) -> Self {
        Self { value, handled }
    }
}
