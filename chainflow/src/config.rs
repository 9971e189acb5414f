//! Chain configuration.

use crate::errors::{ChainError, Result};
use serde::{Deserialize, Serialize};

/// Fallback fan-out width when the host parallelism cannot be queried.
const FALLBACK_CONCURRENCY: usize = 4;

/// Configuration shared by every node of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain name, attached to log spans and events.
    pub name: String,
    /// Fan-out width used by the `*_parallel` sequence adapters.
    pub max_concurrency: usize,
    /// Whether nodes and the scope report lifecycle events to the sink.
    pub emit_events: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: "chain".to_string(),
            max_concurrency: std::thread::available_parallelism()
                .map_or(FALLBACK_CONCURRENCY, std::num::NonZeroUsize::get),
            emit_events: true,
        }
    }
}

impl ChainConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chain name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the default fan-out width.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Enables or disables lifecycle events.
    #[must_use]
    pub fn with_emit_events(mut self, enabled: bool) -> Self {
        self.emit_events = enabled;
        self
    }

    /// Parses and validates a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ChainError::InvalidArgument(format!("invalid chain config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(ChainError::InvalidArgument(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
