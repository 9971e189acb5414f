//! Nodes over bounded sequences (`Chain<Vec<T>>`).
//!
//! Outputs always keep input order, including under fan-out.

use super::fanout::{ensure_chunk_size, ensure_limit, spawn_unit};
use super::ItemStream;
use crate::chain::{Chain, NodeContext, NodeKind};
use crate::errors::ChainError;
use futures::future::ready;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;
use std::sync::Arc;

impl<T: Send + 'static> Chain<Vec<T>> {
    /// Starts a chain over the elements of an iterator.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Self::new(items.into_iter().collect())
    }

    /// Transforms each element in order, one at a time, awaiting each body.
    pub fn map_each_async_with<U, F, Fut>(self, f: F) -> Chain<Vec<U>>
    where
        U: Send + 'static,
        F: Fn(T, NodeContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
    {
        self.append(NodeKind::Map, move |items, ctx| async move {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                ctx.check()?;
                let fut = f(item, ctx.clone());
                out.push(fut.await.map_err(ChainError::from_step)?);
            }
            Ok(out)
        })
    }

    /// Transforms each element in order with a fallible, context-aware body.
    pub fn try_map_each<U, F>(self, f: F) -> Chain<Vec<U>>
    where
        U: Send + 'static,
        F: Fn(T, &NodeContext) -> anyhow::Result<U> + Send + 'static,
    {
        self.map_each_async_with(move |item, ctx| ready(f(item, &ctx)))
    }

    /// Transforms each element in order.
    pub fn map_each<U, F>(self, f: F) -> Chain<Vec<U>>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + 'static,
    {
        self.try_map_each(move |item, _| Ok(f(item)))
    }

    /// Transforms elements on the worker pool with at most `limit` bodies in
    /// flight. The output keeps input order.
    pub fn map_each_concurrent_async_with<U, F, Fut>(self, limit: usize, f: F) -> Chain<Vec<U>>
    where
        U: Send + 'static,
        F: Fn(T, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
    {
        self.append(NodeKind::Map, move |items, ctx| async move {
            ensure_limit(limit)?;
            let f = Arc::new(f);
            stream::iter(items)
                .map(move |item| {
                    let f = Arc::clone(&f);
                    spawn_unit(ctx.clone(), move |ctx| f(item, ctx))
                })
                .buffered(limit)
                .try_collect()
                .await
        })
    }

    /// Transforms elements on the worker pool with at most `limit` in flight.
    pub fn map_each_concurrent<U, F>(self, limit: usize, f: F) -> Chain<Vec<U>>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.map_each_concurrent_async_with(limit, move |item, _| ready(Ok::<_, anyhow::Error>(f(item))))
    }

    /// Transforms elements concurrently using the scope's configured width.
    pub fn map_each_parallel<U, F>(self, f: F) -> Chain<Vec<U>>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let limit = self.scope().config().max_concurrency;
        self.map_each_concurrent(limit, f)
    }

    /// Runs an async side effect for each element in order.
    pub fn for_each_async_with<F, Fut>(self, f: F) -> Chain<()>
    where
        F: Fn(T, NodeContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.append(NodeKind::ForEach, move |items, ctx| async move {
            for item in items {
                ctx.check()?;
                let fut = f(item, ctx.clone());
                fut.await.map_err(ChainError::from_step)?;
            }
            Ok(())
        })
    }

    /// Runs a side effect for each element in order.
    pub fn for_each<F>(self, f: F) -> Chain<()>
    where
        F: Fn(T) + Send + 'static,
    {
        self.for_each_async_with(move |item, _| {
            f(item);
            ready(Ok(()))
        })
    }

    /// Runs async side effects on the worker pool with at most `limit` in
    /// flight. Completion order is unspecified.
    pub fn for_each_concurrent_async_with<F, Fut>(self, limit: usize, f: F) -> Chain<()>
    where
        F: Fn(T, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.append(NodeKind::ForEach, move |items, ctx| async move {
            ensure_limit(limit)?;
            let f = Arc::new(f);
            stream::iter(items)
                .map(move |item| {
                    let f = Arc::clone(&f);
                    spawn_unit(ctx.clone(), move |ctx| f(item, ctx))
                })
                .buffer_unordered(limit)
                .try_for_each(|()| ready(Ok(())))
                .await
        })
    }

    /// Runs side effects on the worker pool with at most `limit` in flight.
    pub fn for_each_concurrent<F>(self, limit: usize, f: F) -> Chain<()>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.for_each_concurrent_async_with(limit, move |item, _| {
            f(item);
            ready(Ok(()))
        })
    }

    /// Groups elements into consecutive chunks of `size`.
    ///
    /// Every chunk holds exactly `size` elements except the last, which holds
    /// the remainder. An empty sequence yields no chunks.
    pub fn chunk(self, size: usize) -> Chain<Vec<Vec<T>>> {
        self.append(NodeKind::Chunk, move |items, ctx| async move {
            ensure_chunk_size(size)?;
            let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
            let mut current = Vec::with_capacity(size);
            for item in items {
                current.push(item);
                if current.len() == size {
                    ctx.check()?;
                    chunks.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
                }
            }
            if !current.is_empty() {
                ctx.check()?;
                chunks.push(current);
            }
            Ok(chunks)
        })
    }

    /// Turns the collection into a streamed sequence.
    pub fn into_stream(self) -> Chain<ItemStream<T>> {
        self.append(NodeKind::Adapter, |items, _| async move { Ok(ItemStream::from_items(items)) })
    }
}
