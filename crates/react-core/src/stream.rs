//! Incremental Output
//!
//! `StreamReader` is the owned handle every streaming producer hands out:
//! model generations, node outputs and the agent's own streamed answer.
//! Dropping (or `close`-ing) the reader releases whatever feeds it, so a
//! consumer that takes the reader by value is guaranteed to close it on
//! every exit path.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt, stream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{AgentError, Result};

type BoxItemStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Owned reader over a fallible stream of items.
pub struct StreamReader<T> {
    inner: BoxItemStream<T>,
}

/// Sending half of a channel-backed `StreamReader`.
pub struct StreamWriter<T> {
    tx: mpsc::UnboundedSender<Result<T>>,
}

impl<T> Clone for StreamWriter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> StreamWriter<T> {
    /// Push one item. Returns `false` once the reader has been closed.
    pub fn send(&self, item: Result<T>) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T: Send + 'static> StreamReader<T> {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Single-item stream
    pub fn from_value(value: T) -> Self {
        Self::from_values(vec![value])
    }

    pub fn from_values(values: Vec<T>) -> Self {
        Self::new(stream::iter(values.into_iter().map(Ok)))
    }

    /// Stream that fails immediately
    pub fn from_error(err: AgentError) -> Self {
        Self::new(stream::iter(std::iter::once(Err(err))))
    }

    /// Unbounded channel pair; the reader ends when every writer is dropped.
    pub fn channel() -> (StreamWriter<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            StreamWriter { tx },
            Self::new(UnboundedReceiverStream::new(rx)),
        )
    }

    /// Next item, or `None` at end of stream.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        self.inner.next().await
    }

    /// Release the reader and its upstream.
    pub fn close(self) {
        drop(self);
    }

    pub fn map<U, F>(self, f: F) -> StreamReader<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Result<U> + Send + 'static,
    {
        let mut f = f;
        StreamReader::new(self.inner.map(move |item| item.and_then(&mut f)))
    }

    /// Drain every item; the first error aborts.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.recv().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Fan the stream out to `n` independent readers.
    ///
    /// A background task pumps the source; it stops, dropping the source,
    /// as soon as every copy has been dropped. Must be called inside a tokio
    /// runtime.
    pub fn copy(self, n: usize) -> Vec<Self>
    where
        T: Clone,
    {
        if n <= 1 {
            return if n == 1 { vec![self] } else { Vec::new() };
        }

        let mut writers = Vec::with_capacity(n);
        let mut readers = Vec::with_capacity(n);
        for _ in 0..n {
            let (writer, reader) = Self::channel();
            writers.push(writer);
            readers.push(reader);
        }
        self.pump_into(writers);
        readers
    }

    /// Two-way `copy`.
    pub fn fork(self) -> (Self, Self)
    where
        T: Clone,
    {
        let (left_tx, left) = Self::channel();
        let (right_tx, right) = Self::channel();
        self.pump_into(vec![left_tx, right_tx]);
        (left, right)
    }

    fn pump_into(self, mut writers: Vec<StreamWriter<T>>)
    where
        T: Clone,
    {
        let mut source = self;
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    item = source.recv() => item,
                    () = all_closed(&writers) => break,
                };
                let Some(item) = item else { break };

                writers.retain(|w| !w.is_closed());
                let Some((first, rest)) = writers.split_first() else {
                    break;
                };
                match item {
                    Ok(value) => {
                        for writer in rest {
                            writer.send(Ok(value.clone()));
                        }
                        first.send(Ok(value));
                    }
                    Err(err) => {
                        for writer in rest {
                            writer.send(Err(err.duplicate()));
                        }
                        first.send(Err(err));
                    }
                }
            }
        });
    }
}

async fn all_closed<T>(writers: &[StreamWriter<T>]) {
    futures::future::join_all(writers.iter().map(|w| w.tx.closed())).await;
}

impl<T> Stream for StreamReader<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<T> std::fmt::Debug for StreamReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_until_end() {
        let mut reader = StreamReader::from_values(vec![1, 2]);
        assert_eq!(reader.recv().await.unwrap().unwrap(), 1);
        assert_eq!(reader.recv().await.unwrap().unwrap(), 2);
        assert!(reader.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_copies_see_every_item() {
        let copies = StreamReader::from_values(vec!["a", "b", "c"]).copy(2);
        assert_eq!(copies.len(), 2);
        for copy in copies {
            assert_eq!(copy.collect_all().await.unwrap(), vec!["a", "b", "c"]);
        }
    }

    #[tokio::test]
    async fn test_dropping_one_copy_keeps_the_other() {
        let (writer, reader) = StreamReader::channel();
        let mut copies = reader.copy(2);
        let survivor = copies.pop().unwrap();
        copies.pop().unwrap().close();

        writer.send(Ok(7));
        drop(writer);
        assert_eq!(survivor.collect_all().await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_source_released_when_all_copies_drop() {
        let (writer, reader) = StreamReader::<u8>::channel();
        for copy in reader.copy(3) {
            copy.close();
        }
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !writer.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("pump should release the source");
    }

    #[tokio::test]
    async fn test_errors_reach_every_copy() {
        let copies = StreamReader::<u8>::from_error(AgentError::StepLimitExceeded(3)).copy(2);
        for copy in copies {
            let err = copy.collect_all().await.unwrap_err();
            assert!(err.is_step_limit());
        }
    }

    #[tokio::test]
    async fn test_fork() {
        let (left, right) = StreamReader::from_values(vec![1, 2]).fork();
        drop(left);
        assert_eq!(right.collect_all().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_map() {
        let doubled = StreamReader::from_values(vec![1, 2]).map(|v| Ok(v * 2));
        assert_eq!(doubled.collect_all().await.unwrap(), vec![2, 4]);
    }
}
