//! Scope fixtures for chain tests.

use std::sync::Arc;

use crate::cancellation::{CancellationToken, ChainScope};
use crate::config::ChainConfig;
use crate::events::CollectingEventSink;

/// A scope wired to a collecting sink, so tests can inspect emitted events.
#[derive(Debug, Clone)]
pub struct TestScope {
    /// The scope to bind chains to.
    pub scope: ChainScope,
    /// Every event the scope and its nodes emit.
    pub sink: Arc<CollectingEventSink>,
}

impl TestScope {
    /// Creates a fresh scope with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ChainConfig::default())
    }

    /// Creates a fresh scope with `config`.
    #[must_use]
    pub fn with_config(config: ChainConfig) -> Self {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = ChainScope::builder()
            .config(config)
            .sink(sink.clone())
            .build();
        Self { scope, sink }
    }

    /// Creates a scope cancelled whenever `parent` is.
    #[must_use]
    pub fn linked(parent: &CancellationToken) -> Self {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = ChainScope::builder()
            .parent(parent.clone())
            .sink(sink.clone())
            .build();
        Self { scope, sink }
    }

    /// Returns a handle to the scope.
    #[must_use]
    pub fn scope(&self) -> ChainScope {
        self.scope.clone()
    }

    /// Event types emitted so far, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.sink.event_types()
    }
}

impl Default for TestScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    #[test]
    fn test_scope_events_are_collected() {
        let fixture = TestScope::new();
        fixture.scope.cancel("done").unwrap();
        assert_eq!(fixture.event_types(), vec![events::SCOPE_CANCELLED.to_string()]);
    }

    #[test]
    fn test_linked_fixture_follows_parent() {
        let parent = CancellationToken::new();
        let fixture = TestScope::linked(&parent);
        parent.cancel("upstream");
        assert!(fixture.scope.is_cancelled());
    }
}
