//! Nodes over streamed sequences (`Chain<ItemStream<T>>`).
//!
//! Mapping nodes return a new lazy stream: element bodies run as the stream
//! is consumed by a later node. Side-effect and collecting nodes drain the
//! stream.
//!
//! For a lazy node, `node.completed` and its duration cover building the
//! stream, not running the element bodies. The bodies still run inside the
//! node's `chain_node` span wherever the stream is drained.

use super::fanout::{ensure_chunk_size, ensure_limit, spawn_unit};
use super::ItemStream;
use crate::chain::{Chain, NodeContext, NodeKind};
use crate::errors::{ChainError, Result};
use futures::future::ready;
use futures::stream::{Stream, StreamExt, TryChunksError, TryStreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

impl<T: Send + 'static> Chain<ItemStream<T>> {
    /// Starts a chain over a stream of elements.
    pub fn from_stream<S>(source: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self::new(ItemStream::from_stream(source))
    }

    /// Starts a chain over a stream whose elements may carry errors.
    pub fn from_try_stream<S>(source: S) -> Self
    where
        S: Stream<Item = anyhow::Result<T>> + Send + 'static,
    {
        Self::new(ItemStream::from_try_stream(source))
    }

    /// Transforms each element in stream order, awaiting each body.
    pub fn map_each_async_with<U, F, Fut>(self, f: F) -> Chain<ItemStream<U>>
    where
        U: Send + 'static,
        F: Fn(T, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
    {
        self.append(NodeKind::Map, move |source, ctx| async move {
            let f = Arc::new(f);
            let span = tracing::Span::current();
            let mapped = source.then(move |item| {
                let f = Arc::clone(&f);
                let ctx = ctx.clone();
                async move {
                    let item = item?;
                    ctx.check()?;
                    let fut = f(item, ctx);
                    fut.await.map_err(ChainError::from_step)
                }
                .instrument(span.clone())
            });
            Ok(ItemStream::new(mapped))
        })
    }

    /// Transforms each element with a fallible, context-aware body.
    pub fn try_map_each<U, F>(self, f: F) -> Chain<ItemStream<U>>
    where
        U: Send + 'static,
        F: Fn(T, &NodeContext) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        self.map_each_async_with(move |item, ctx| ready(f(item, &ctx)))
    }

    /// Transforms each element.
    pub fn map_each<U, F>(self, f: F) -> Chain<ItemStream<U>>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.try_map_each(move |item, _| Ok(f(item)))
    }

    /// Transforms elements on the worker pool with at most `limit` in flight.
    ///
    /// Results are yielded as they complete, not in input order.
    pub fn map_each_concurrent_async_with<U, F, Fut>(
        self,
        limit: usize,
        f: F,
    ) -> Chain<ItemStream<U>>
    where
        U: Send + 'static,
        F: Fn(T, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
    {
        self.append(NodeKind::Map, move |source, ctx| async move {
            ensure_limit(limit)?;
            let f = Arc::new(f);
            let span = tracing::Span::current();
            let mapped = source
                .map(move |item| {
                    let f = Arc::clone(&f);
                    let ctx = ctx.clone();
                    async move {
                        let item = item?;
                        spawn_unit(ctx, move |ctx| f(item, ctx)).await
                    }
                    .instrument(span.clone())
                })
                .buffer_unordered(limit);
            Ok(ItemStream::new(mapped))
        })
    }

    /// Transforms elements on the worker pool with at most `limit` in flight.
    pub fn map_each_concurrent<U, F>(self, limit: usize, f: F) -> Chain<ItemStream<U>>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.map_each_concurrent_async_with(limit, move |item, _| {
            ready(Ok::<_, anyhow::Error>(f(item)))
        })
    }

    /// Transforms elements concurrently using the scope's configured width.
    pub fn map_each_parallel<U, F>(self, f: F) -> Chain<ItemStream<U>>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let limit = self.scope().config().max_concurrency;
        self.map_each_concurrent(limit, f)
    }

    /// Drains the stream, running an async side effect for each element.
    pub fn for_each_async_with<F, Fut>(self, f: F) -> Chain<()>
    where
        F: Fn(T, NodeContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.append(NodeKind::ForEach, move |mut source, ctx| async move {
            while let Some(item) = source.next().await {
                let item = item?;
                ctx.check()?;
                let fut = f(item, ctx.clone());
                fut.await.map_err(ChainError::from_step)?;
            }
            Ok(())
        })
    }

    /// Drains the stream, running a side effect for each element.
    pub fn for_each<F>(self, f: F) -> Chain<()>
    where
        F: Fn(T) + Send + 'static,
    {
        self.for_each_async_with(move |item, _| {
            f(item);
            ready(Ok(()))
        })
    }

    /// Drains the stream, running async side effects on the worker pool with
    /// at most `limit` in flight.
    pub fn for_each_concurrent_async_with<F, Fut>(self, limit: usize, f: F) -> Chain<()>
    where
        F: Fn(T, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.append(NodeKind::ForEach, move |source, ctx| async move {
            ensure_limit(limit)?;
            let f = Arc::new(f);
            source
                .map(move |item| {
                    let f = Arc::clone(&f);
                    let ctx = ctx.clone();
                    async move {
                        let item = item?;
                        spawn_unit(ctx, move |ctx| f(item, ctx)).await
                    }
                })
                .buffer_unordered(limit)
                .try_for_each(|()| ready(Ok(())))
                .await
        })
    }

    /// Drains the stream, running side effects on the worker pool.
    pub fn for_each_concurrent<F>(self, limit: usize, f: F) -> Chain<()>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.for_each_concurrent_async_with(limit, move |item, _| {
            f(item);
            ready(Ok(()))
        })
    }

    /// Groups elements into consecutive chunks of `size`; the last chunk
    /// holds the remainder.
    pub fn chunk(self, size: usize) -> Chain<ItemStream<Vec<T>>> {
        self.append(NodeKind::Chunk, move |source, ctx| async move {
            ensure_chunk_size(size)?;
            let chunks = source.try_chunks(size).map(move |chunk| -> Result<Vec<T>> {
                match chunk {
                    Ok(chunk) => {
                        ctx.check()?;
                        Ok(chunk)
                    }
                    Err(TryChunksError(_, err)) => Err(err),
                }
            });
            Ok(ItemStream::new(chunks))
        })
    }

    /// Drains the stream into a collection, keeping stream order.
    pub fn collect(self) -> Chain<Vec<T>> {
        self.append(NodeKind::Adapter, move |mut source, ctx| async move {
            let mut items = Vec::new();
            while let Some(item) = source.next().await {
                let item = item?;
                ctx.check()?;
                items.push(item);
            }
            Ok(items)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::{CancellationToken, ChainScope};
    use crate::testing::ConcurrencyGauge;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_map_each_keeps_stream_order() {
        let out = Chain::from_stream(stream::iter(1..=4))
            .map_each(|v| v * v)
            .collect()
            .await
            .unwrap();
        assert_eq!(out, vec![1, 4, 9, 16]);
    }

    #[tokio::test]
    async fn test_mapping_is_lazy_until_drained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let stream = Chain::from_stream(stream::iter(0..3))
            .map_each(move |v| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                v
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let drained: Vec<i32> = stream.try_collect().await.unwrap();
        assert_eq!(drained.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upstream_error_ends_stream() {
        let source = stream::iter(vec![Ok(1), Err(anyhow::anyhow!("sensor offline")), Ok(3)]);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let err = Chain::from_try_stream(source)
            .for_each(move |_| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap_err();

        assert!(err.is_step_failure());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_map_yields_every_result() {
        let gauge = ConcurrencyGauge::new();
        let tracked = gauge.clone();

        let mut out = Chain::from_stream(stream::iter(0..16u64))
            .map_each_concurrent_async_with(4, move |v, _| {
                let gauge = tracked.clone();
                async move {
                    let _guard = gauge.enter();
                    tokio::time::sleep(Duration::from_millis(16 - v)).await;
                    Ok(v + 100)
                }
            })
            .collect()
            .await
            .unwrap();

        out.sort_unstable();
        assert_eq!(out, (100..116).collect::<Vec<_>>());
        assert!(gauge.peak() <= 4, "peak was {}", gauge.peak());
    }

    #[tokio::test]
    async fn test_concurrent_map_rejects_zero_limit() {
        let err = Chain::from_stream(stream::iter(vec![1]))
            .map_each_concurrent(0, |v| v)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_for_each_concurrent_drains_everything() {
        let total = Arc::new(AtomicUsize::new(0));
        let total_clone = total.clone();

        Chain::from_stream(stream::iter(1..=10usize))
            .for_each_concurrent(3, move |v| {
                total_clone.fetch_add(v, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(total.load(Ordering::SeqCst), 55);
    }

    #[tokio::test]
    async fn test_chunk_then_sum() {
        let sums = Chain::from_stream(stream::iter(vec![1, 2, 3, 4, 5]))
            .chunk(2)
            .map_each(|chunk| chunk.into_iter().sum::<i32>())
            .collect()
            .await
            .unwrap();
        assert_eq!(sums, vec![3, 7, 5]);
    }

    #[tokio::test]
    async fn test_chunk_of_empty_stream() {
        let chunks = Chain::from_stream(stream::iter(Vec::<u8>::new()))
            .chunk(4)
            .collect()
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_zero_is_invalid() {
        let err = Chain::from_stream(stream::iter(vec![1]))
            .chunk(0)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_bound_token_stops_consumption() {
        let token = CancellationToken::new();
        let trip = token.clone();

        let err = Chain::from_stream(stream::iter(0..100))
            .with_token(token)
            .for_each(move |v| {
                if v == 4 {
                    trip.cancel("seen enough");
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_unbounded_source_with_cancellation() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let err = Chain::from_stream(stream::iter(0u64..))
            .for_each_async_with(move |_, ctx| {
                let seen = seen_clone.clone();
                async move {
                    if seen.fetch_add(1, Ordering::SeqCst) + 1 == 50 {
                        ctx.cancel("limit reached")?;
                    }
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(seen.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_concurrent_map_stops_after_cancel() {
        let started = Arc::new(AtomicUsize::new(0));
        let started_clone = started.clone();

        let err = Chain::from_stream(stream::iter(0u64..))
            .map_each_concurrent_async_with(4, move |v, ctx| {
                let started = started_clone.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if v == 0 {
                        ctx.cancel("stop fan-out")?;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(v)
                }
            })
            .collect()
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(started.load(Ordering::SeqCst) <= 4, "started {}", started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_for_each_concurrent_stops_after_cancel() {
        let gauge = ConcurrencyGauge::new();
        let tracked = gauge.clone();

        let err = Chain::from_stream(stream::iter(0u64..))
            .for_each_concurrent_async_with(3, move |v, ctx| {
                let gauge = tracked.clone();
                async move {
                    let _guard = gauge.enter();
                    if v == 0 {
                        ctx.cancel("drain aborted")?;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(gauge.peak() <= 3, "peak was {}", gauge.peak());
        assert!(gauge.total() <= 3, "started {}", gauge.total());
    }

    #[tokio::test]
    async fn test_chunk_checks_cancellation_per_chunk() {
        let trigger = CancellationToken::new();
        let trip = trigger.clone();
        let pulled = Arc::new(AtomicUsize::new(0));
        let pulled_clone = pulled.clone();

        let source = stream::iter(0u64..).map(move |v| {
            pulled_clone.fetch_add(1, Ordering::SeqCst);
            if v == 5 {
                trip.cancel("upstream stop");
            }
            v
        });

        let err = Chain::with_scope(ItemStream::from_stream(source), ChainScope::linked(&trigger))
            .chunk(2)
            .collect()
            .await
            .unwrap_err();

        assert!(matches!(err, ChainError::Cancelled { reason: Some(ref r) } if r == "upstream stop"));
        // Chunks [0, 1] and [2, 3] pass; [4, 5] is refused.
        assert_eq!(pulled.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_lazy_bodies_run_in_node_span() {
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_test_writer()
                .finish(),
        );
        let spans = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let record = spans.clone();
        let sequential = Chain::from_stream(stream::iter(0..2))
            .map_each(move |v| {
                let name = tracing::Span::current().metadata().map(|m| m.name());
                record.lock().push(name);
                v
            })
            .await
            .unwrap();

        let record = spans.clone();
        let concurrent = Chain::from_stream(stream::iter(0..2))
            .map_each_concurrent(2, move |v| {
                let name = tracing::Span::current().metadata().map(|m| m.name());
                record.lock().push(name);
                v
            })
            .await
            .unwrap();

        // Drained outside any chain node.
        let _: Vec<i32> = sequential.try_collect().await.unwrap();
        let _: Vec<i32> = concurrent.try_collect().await.unwrap();

        let spans = spans.lock();
        assert_eq!(spans.len(), 4);
        assert!(spans.iter().all(|name| *name == Some("chain_node")), "{spans:?}");
    }
}
