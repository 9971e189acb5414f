//! # Chainflow
//!
//! Fluent composition of asynchronous processing chains.
//!
//! Chainflow lets you build a chain of processing nodes over a value with
//! support for:
//!
//! - **Deferred values**: a [`Chain`](chain::Chain) is a lazy computation you
//!   extend node by node and finally await
//! - **Cooperative cancellation**: every chain carries a scope whose token can
//!   be cancelled from outside, from a parent token, or from inside a node
//! - **Chain of responsibility**: handler nodes latch a shared "handled" flag
//!   and later handlers are skipped
//! - **Sequence adapters**: element-wise mapping, bounded fan-out over the
//!   tokio worker pool, side-effect fan-out and chunking, over collections
//!   and streams
//! - **Event-driven observability**: node lifecycle events and tracing spans
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chainflow::prelude::*;
//!
//! let sale = Chain::new(Sale::new(50))
//!     .handle(|sale| approve_small(sale))
//!     .handle(|sale| approve_large(sale))
//!     .fail_if_not_handled()
//!     .await?;
//!
//! let totals = Chain::from_items(orders)
//!     .map_each_concurrent(8, |order| order.total())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod chain;
pub mod config;
pub mod errors;
pub mod events;
pub mod observability;
pub mod sequence;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, ChainScope, ScopeBuilder};
    pub use crate::chain::{Chain, HandlerOutcome, NodeContext, NodeKind};
    pub use crate::config::ChainConfig;
    pub use crate::errors::{ChainError, Result};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, SpanTimer};
    pub use crate::sequence::ItemStream;
}
