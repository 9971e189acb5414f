//! The streamed sequence type carried by streamed chains.

use crate::errors::{ChainError, Result};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A boxed, possibly unbounded stream of chain elements.
///
/// The stream ends right after yielding its first error, so consumers never
/// see elements produced after a failure or cancellation.
pub struct ItemStream<T> {
    inner: BoxStream<'static, Result<T>>,
}

impl<T: Send + 'static> ItemStream<T> {
    /// Wraps a stream of fallible elements.
    pub fn new<S>(source: S) -> Self
    where
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        let inner = source
            .scan(false, |failed, item| {
                if *failed {
                    return futures::future::ready(None);
                }
                *failed = item.is_err();
                futures::future::ready(Some(item))
            })
            .boxed();
        Self { inner }
    }

    /// Wraps a stream of plain elements.
    pub fn from_stream<S>(source: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self::new(source.map(Ok))
    }

    /// Wraps a stream whose elements may carry caller errors.
    pub fn from_try_stream<S>(source: S) -> Self
    where
        S: Stream<Item = anyhow::Result<T>> + Send + 'static,
    {
        Self::new(source.map(|item| item.map_err(ChainError::from_step)))
    }

    /// Streams the elements of an iterator.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(stream::iter(items))
    }
}

impl<T> ItemStream<T> {
    /// Returns the underlying boxed stream.
    pub fn into_inner(self) -> BoxStream<'static, Result<T>> {
        self.inner
    }
}

impl<T> Stream for ItemStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> fmt::Debug for ItemStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemStream")
            .field("item_type", &std::any::type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_from_items_yields_in_order() {
        let items: Vec<i32> = ItemStream::from_items(vec![1, 2, 3]).try_collect().await.unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stream_stops_after_first_error() {
        let source = stream::iter(vec![
            Ok(1),
            Err(ChainError::InvalidArgument("bad".into())),
            Ok(3),
        ]);
        let seen: Vec<Result<i32>> = ItemStream::new(source).collect().await;

        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_ok());
        assert!(seen[1].is_err());
    }

    #[tokio::test]
    async fn test_from_try_stream_keeps_caller_error() {
        let source = stream::iter(vec![Ok(1), Err(anyhow::anyhow!("feed dropped"))]);
        let err = ItemStream::from_try_stream(source)
            .try_collect::<Vec<i32>>()
            .await
            .unwrap_err();
        assert!(err.is_step_failure());
    }
}
