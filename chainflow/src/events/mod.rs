//! Event sinks for chain observability.
//!
//! Every node reports its lifecycle (`node.started`, `node.completed`,
//! `node.failed`, `node.cancelled`, `node.skipped`) to the sink attached to
//! its [`ChainScope`](crate::cancellation::ChainScope). Scope-level events
//! (`scope.cancelled`, `scope.handled`, `scope.released`) go to the same sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

#[cfg(test)]
pub use sink::MockEventSink;

/// A node began running its body.
pub const NODE_STARTED: &str = "node.started";
/// A node body returned successfully.
pub const NODE_COMPLETED: &str = "node.completed";
/// A node body returned an error.
pub const NODE_FAILED: &str = "node.failed";
/// A node observed cancellation.
pub const NODE_CANCELLED: &str = "node.cancelled";
/// A handler node skipped its predicate because the chain was already handled.
pub const NODE_SKIPPED: &str = "node.skipped";
/// The scope was cancelled.
pub const SCOPE_CANCELLED: &str = "scope.cancelled";
/// The scope was marked handled.
pub const SCOPE_HANDLED: &str = "scope.handled";
/// The scope was released.
pub const SCOPE_RELEASED: &str = "scope.released";

/// Current time as an RFC 3339 string, used in event payloads.
#[must_use]
pub fn event_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
