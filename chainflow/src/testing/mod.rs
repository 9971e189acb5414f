//! Testing utilities for chains.
//!
//! This module provides:
//! - Assertions over chain errors
//! - Recorders for node calls and fan-out width
//! - Scope fixtures with an inspectable event sink

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_cancelled, assert_cancelled_with_reason, assert_invalid_argument, assert_not_handled,
    assert_step_failed,
};
pub use fixtures::TestScope;
pub use mocks::{CallRecorder, ConcurrencyGauge, GaugeGuard};
