//! Cooperative cancellation for chains.
//!
//! This module provides:
//! - CancellationToken, a shareable, linkable cancellation signal
//! - ChainScope, the per-chain context holding the token and the "handled" flag

mod scope;
mod token;

pub use scope::{ChainScope, ScopeBuilder};
pub use token::{CallbackId, CancelCallback, CancellationToken};
