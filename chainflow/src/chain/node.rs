//! The canonical append operation every node reduces to.

use super::{Chain, NodeContext, NodeKind};
use crate::events;
use crate::errors::Result;
use crate::observability::SpanTimer;
use std::future::Future;
use tracing::{debug, debug_span, trace, Instrument};

impl<T: Send + 'static> Chain<T> {
    /// Appends a node whose body runs after the prior computation succeeds.
    ///
    /// The body only starts if neither the scope nor the node's token is
    /// cancelled. A failed prior computation skips the body entirely.
    pub(crate) fn append<U, F, Fut>(self, kind: NodeKind, body: F) -> Chain<U>
    where
        U: Send + 'static,
        F: FnOnce(T, NodeContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        let Self {
            scope,
            future: prior,
            next_token,
        } = self;
        let index = scope.next_node_index();
        let ctx = NodeContext::new(scope.clone(), next_token, index, kind);
        let span = debug_span!(
            "chain_node",
            chain = %scope.config().name,
            run_id = %scope.run_id(),
            node = index,
            kind = %kind,
        );

        Chain::from_parts(scope, async move {
            let value = prior.await?;
            run_node(ctx, value, body).instrument(span).await
        })
    }
}

async fn run_node<T, U, F, Fut>(ctx: NodeContext, value: T, body: F) -> Result<U>
where
    F: FnOnce(T, NodeContext) -> Fut,
    Fut: Future<Output = Result<U>>,
{
    if let Err(err) = ctx.check() {
        debug!(error = %err, "Node not started");
        emit_node_event(&ctx, events::NODE_CANCELLED, serde_json::json!({ "error": err.to_string() }));
        return Err(err);
    }

    debug!("Node started");
    emit_node_event(&ctx, events::NODE_STARTED, serde_json::json!({}));
    let timer = SpanTimer::start(ctx.kind().as_str());

    let result = body(value, ctx.clone()).await;
    let duration_ms = timer.finish();

    match &result {
        Ok(_) => {
            trace!(duration_ms, "Node completed");
            emit_node_event(&ctx, events::NODE_COMPLETED, serde_json::json!({ "duration_ms": duration_ms }));
        }
        Err(err) if err.is_cancelled() => {
            debug!(duration_ms, error = %err, "Node cancelled");
            emit_node_event(
                &ctx,
                events::NODE_CANCELLED,
                serde_json::json!({ "duration_ms": duration_ms, "error": err.to_string() }),
            );
        }
        Err(err) => {
            debug!(duration_ms, error = %err, error_kind = err.kind(), "Node failed");
            emit_node_event(
                &ctx,
                events::NODE_FAILED,
                serde_json::json!({
                    "duration_ms": duration_ms,
                    "error": err.to_string(),
                    "error_kind": err.kind(),
                }),
            );
        }
    }

    result
}

/// Emits a node lifecycle event to the scope's sink.
pub(crate) fn emit_node_event(ctx: &NodeContext, event_type: &str, extra: serde_json::Value) {
    let scope = ctx.scope();
    if !scope.config().emit_events {
        return;
    }
    let mut payload = serde_json::json!({
        "run_id": scope.run_id().to_string(),
        "chain": scope.config().name,
        "node": ctx.node_index(),
        "kind": ctx.kind().as_str(),
        "timestamp": events::event_timestamp(),
    });
    if let (serde_json::Value::Object(map), serde_json::Value::Object(extra)) = (&mut payload, extra) {
        map.extend(extra);
    }
    scope.emit(event_type, payload);
}
