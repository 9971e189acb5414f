//! Error types for chain execution.
//!
//! Every failure that reaches an awaited [`Chain`](crate::chain::Chain) is a
//! [`ChainError`]. Errors raised by step bodies keep their original type inside
//! [`ChainError::StepFailed`] so callers can downcast them.

use thiserror::Error;

/// Result alias used throughout chainflow.
pub type Result<T, E = ChainError> = std::result::Result<T, E>;

/// The error type produced by a chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Cancellation was observed at a checkpoint.
    #[error("Chain cancelled{}", fmt_suffix(.reason))]
    Cancelled {
        /// The reason given when cancellation was requested, if any.
        reason: Option<String>,
    },

    /// A step body returned an error.
    #[error("Step failed: {0}")]
    StepFailed(#[source] anyhow::Error),

    /// `fail_if_not_handled` ran and no handler marked the chain handled.
    #[error("Chain not handled{}", fmt_suffix(.message))]
    NotHandled {
        /// Optional caller-supplied message.
        message: Option<String>,
    },

    /// The scope was used after it was released.
    #[error("Chain scope has been released")]
    ScopeReleased,

    /// A chain operation was given an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A fanned-out unit of work panicked or was aborted.
    #[error("Task join error: {0}")]
    TaskJoin(String),
}

fn fmt_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

impl ChainError {
    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: Option<String>) -> Self {
        Self::Cancelled { reason }
    }

    /// Creates a not-handled error.
    #[must_use]
    pub fn not_handled(message: Option<String>) -> Self {
        Self::NotHandled { message }
    }

    /// Converts an error raised by a step body.
    ///
    /// A `ChainError` that travelled through `anyhow` (for example a body
    /// calling `ctx.check()?`) is unwrapped so its kind is preserved.
    #[must_use]
    pub fn from_step(error: anyhow::Error) -> Self {
        match error.downcast::<ChainError>() {
            Ok(chain_error) => chain_error,
            Err(other) => Self::StepFailed(other),
        }
    }

    /// Converts a join error from a spawned unit of work.
    #[must_use]
    pub fn from_join(error: &tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::TaskJoin("task was aborted".to_string())
        } else {
            Self::TaskJoin(format!("task panicked: {error}"))
        }
    }

    /// Returns true if this is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true if this is a not-handled escalation.
    #[must_use]
    pub fn is_not_handled(&self) -> bool {
        matches!(self, Self::NotHandled { .. })
    }

    /// Returns true if a step body failed.
    #[must_use]
    pub fn is_step_failure(&self) -> bool {
        matches!(self, Self::StepFailed(_))
    }

    /// Returns the step body's error, if this is a step failure.
    #[must_use]
    pub fn step_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::StepFailed(err) => Some(err),
            _ => None,
        }
    }

    /// Downcasts the step body's error to a concrete type.
    #[must_use]
    pub fn downcast_step_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.step_error().and_then(|err| err.downcast_ref::<E>())
    }

    /// Short label used in logs and events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cancelled { .. } => "cancelled",
            Self::StepFailed(_) => "step_failed",
            Self::NotHandled { .. } => "not_handled",
            Self::ScopeReleased => "scope_released",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::TaskJoin(_) => "task_join",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Error, PartialEq)]
    #[error("out of stock: {0}")]
    struct OutOfStock(String);

    #[test]
    fn test_cancelled_display() {
        assert_eq!(ChainError::cancelled(None).to_string(), "Chain cancelled");
        assert_eq!(
            ChainError::cancelled(Some("deadline".into())).to_string(),
            "Chain cancelled: deadline"
        );
    }

    #[test]
    fn test_not_handled_display() {
        let err = ChainError::not_handled(Some("no approver".into()));
        assert_eq!(err.to_string(), "Chain not handled: no approver");
        assert!(err.is_not_handled());
    }

    #[test]
    fn test_from_step_keeps_domain_error() {
        let err = ChainError::from_step(anyhow::Error::new(OutOfStock("sku-1".into())));

        assert!(err.is_step_failure());
        assert_eq!(
            err.downcast_step_ref::<OutOfStock>(),
            Some(&OutOfStock("sku-1".into()))
        );
    }

    #[test]
    fn test_from_step_unwraps_chain_error() {
        let smuggled = anyhow::Error::new(ChainError::cancelled(Some("stop".into())));
        let err = ChainError::from_step(smuggled);

        assert!(err.is_cancelled());
        assert_eq!(err.kind(), "cancelled");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ChainError::ScopeReleased.kind(), "scope_released");
        assert_eq!(ChainError::InvalidArgument("x".into()).kind(), "invalid_argument");
        assert_eq!(ChainError::TaskJoin("x".into()).kind(), "task_join");
    }
}
