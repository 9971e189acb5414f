//! Spawning of fanned-out units of work.

use crate::chain::NodeContext;
use crate::errors::{ChainError, Result};
use std::future::Future;
use tracing::Instrument;

/// Rejects a zero fan-out width.
pub(crate) fn ensure_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(ChainError::InvalidArgument(
            "concurrency limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Rejects a zero chunk size.
pub(crate) fn ensure_chunk_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(ChainError::InvalidArgument(
            "chunk size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Runs one element's work on the runtime's worker pool.
///
/// The unit does not start if the chain is already cancelled. Once started
/// it runs to completion even if the chain is cancelled meanwhile.
pub(crate) async fn spawn_unit<U, W, Fut>(ctx: NodeContext, work: W) -> Result<U>
where
    U: Send + 'static,
    W: FnOnce(NodeContext) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
{
    ctx.check()?;
    let handle = tokio::spawn(
        async move { work(ctx).await.map_err(ChainError::from_step) }.in_current_span(),
    );
    handle.await.map_err(|e| ChainError::from_join(&e))?
}
