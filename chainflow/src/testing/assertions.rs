//! Test assertions for chain results.

use crate::errors::{ChainError, Result};
use std::fmt::Debug;

/// Asserts that the result failed because the chain was cancelled.
pub fn assert_cancelled<T: Debug>(result: &Result<T>) {
    assert!(
        matches!(result, Err(err) if err.is_cancelled()),
        "Expected cancellation, got: {:?}",
        result
    );
}

/// Asserts that the result failed with a cancellation carrying `expected`.
pub fn assert_cancelled_with_reason<T: Debug>(result: &Result<T>, expected: &str) {
    match result {
        Err(ChainError::Cancelled { reason }) => assert_eq!(
            reason.as_deref(),
            Some(expected),
            "Expected cancellation reason '{}', got {:?}",
            expected,
            reason
        ),
        other => panic!("Expected cancellation, got: {other:?}"),
    }
}

/// Asserts that the result failed because no handler handled the value.
pub fn assert_not_handled<T: Debug>(result: &Result<T>) {
    assert!(
        matches!(result, Err(err) if err.is_not_handled()),
        "Expected not-handled failure, got: {:?}",
        result
    );
}

/// Asserts that a node body failed with an error whose message contains
/// `needle`.
pub fn assert_step_failed<T: Debug>(result: &Result<T>, needle: &str) {
    match result {
        Err(err) if err.is_step_failure() => assert!(
            format!("{err:#}").contains(needle),
            "Expected step error containing '{}', got: {:#}",
            needle,
            err
        ),
        other => panic!("Expected step failure, got: {other:?}"),
    }
}

/// Asserts that the result failed with an invalid argument.
pub fn assert_invalid_argument<T: Debug>(result: &Result<T>) {
    assert!(
        matches!(result, Err(ChainError::InvalidArgument(_))),
        "Expected invalid argument, got: {:?}",
        result
    );
}
