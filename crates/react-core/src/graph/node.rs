//! Node, branch and pre-handler contracts.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::stream::StreamReader;

/// Values that can be rebuilt from streamed chunks.
pub trait Concat: Sized {
    fn concat(chunks: Vec<Self>) -> Result<Self>;
}

/// One computation step.
///
/// `stream` defaults to a single-chunk stream over `invoke`.
#[async_trait]
pub trait Node<S, V>: Send + Sync
where
    S: Send + Sync + 'static,
    V: Send + 'static,
{
    async fn invoke(&self, state: &Arc<S>, input: V) -> Result<V>;

    async fn stream(&self, state: &Arc<S>, input: V) -> Result<StreamReader<V>> {
        let output = self.invoke(state, input).await?;
        Ok(StreamReader::from_value(output))
    }
}

/// Conditional edge: picks the next node from a step's output.
///
/// The branch owns `output` and must not hand it back; dropping it is how
/// the reader gets closed on every path.
#[async_trait]
pub trait Branch<S, V>: Send + Sync
where
    S: Send + Sync + 'static,
    V: Send + 'static,
{
    async fn route(&self, state: &Arc<S>, output: StreamReader<V>) -> Result<String>;
}

/// Runs before a node with the run state; may rewrite the node input.
pub type PreHandler<S, V> = Arc<dyn Fn(V, &S) -> Result<V> + Send + Sync>;

/// Per-node registration options.
pub struct NodeOptions<S, V> {
    pub(super) name: Option<String>,
    pub(super) pre_handler: Option<PreHandler<S, V>>,
}

impl<S, V> Default for NodeOptions<S, V> {
    fn default() -> Self {
        Self {
            name: None,
            pre_handler: None,
        }
    }
}

impl<S, V> NodeOptions<S, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name used in logs; defaults to the node key.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn pre_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(V, &S) -> Result<V> + Send + Sync + 'static,
    {
        self.pre_handler = Some(Arc::new(f));
        self
    }
}
