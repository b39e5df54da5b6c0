//! Compiled graph: immutable, runs via `invoke` or `stream`.
//!
//! Built by `StateGraph::compile`. Starts at the entry node and follows each
//! node's edge or branch until `END`. In stream mode every node is asked for
//! a stream; outputs feeding a branch are forked so the branch can inspect a
//! copy while the other copy either becomes the next node's input
//! (concatenated) or, at `END`, the run's output as-is.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::stream::StreamReader;

use super::END;
use super::node::{Branch, Concat, Node, PreHandler};

pub(super) struct NodeEntry<S, V> {
    pub(super) name: String,
    pub(super) node: Arc<dyn Node<S, V>>,
    pub(super) pre_handler: Option<PreHandler<S, V>>,
}

pub(super) enum Successor<S, V> {
    Edge(String),
    Branch {
        branch: Arc<dyn Branch<S, V>>,
        targets: HashSet<String>,
    },
}

impl<S, V> Successor<S, V> {
    pub(super) fn targets(&self) -> Vec<&str> {
        match self {
            Self::Edge(to) => vec![to.as_str()],
            Self::Branch { targets, .. } => targets.iter().map(String::as_str).collect(),
        }
    }
}

enum Output<V> {
    Value(V),
    Stream(StreamReader<V>),
}

impl<V> Output<V>
where
    V: Clone + Concat + Send + 'static,
{
    /// Branch probe plus the copy that keeps flowing.
    fn split(self) -> (StreamReader<V>, Self) {
        match self {
            Self::Value(v) => (StreamReader::from_value(v.clone()), Self::Value(v)),
            Self::Stream(s) => {
                let (probe, kept) = s.fork();
                (probe, Self::Stream(kept))
            }
        }
    }

    async fn into_value(self) -> Result<V> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Stream(s) => V::concat(s.collect_all().await?),
        }
    }

    fn into_stream(self) -> StreamReader<V> {
        match self {
            Self::Value(v) => StreamReader::from_value(v),
            Self::Stream(s) => s,
        }
    }
}

/// Runnable graph with a per-run step bound.
pub struct CompiledGraph<S, V> {
    pub(super) name: String,
    pub(super) max_steps: usize,
    pub(super) entry: String,
    pub(super) nodes: HashMap<String, NodeEntry<S, V>>,
    pub(super) successors: HashMap<String, Successor<S, V>>,
}

impl<S, V> CompiledGraph<S, V>
where
    S: Send + Sync + 'static,
    V: Clone + Concat + Send + Sync + 'static,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Run to completion and return the final value.
    pub async fn invoke(&self, state: Arc<S>, input: V) -> Result<V> {
        self.run(&state, input, false).await?.into_value().await
    }

    /// Run with streaming nodes; the returned reader carries the output of
    /// the last node as it is produced.
    pub async fn stream(&self, state: Arc<S>, input: V) -> Result<StreamReader<V>> {
        Ok(self.run(&state, input, true).await?.into_stream())
    }

    async fn run(&self, state: &Arc<S>, input: V, streaming: bool) -> Result<Output<V>> {
        let mut current = self.entry.clone();
        let mut input = input;
        let mut steps = 0;

        loop {
            if steps >= self.max_steps {
                tracing::warn!(graph = %self.name, max_steps = self.max_steps, "step limit reached");
                return Err(AgentError::StepLimitExceeded(self.max_steps));
            }
            steps += 1;

            let entry = self
                .nodes
                .get(&current)
                .ok_or_else(|| AgentError::Graph(format!("unknown node {current}")))?;
            tracing::debug!(graph = %self.name, node = %entry.name, step = steps, "running node");

            let node_input = match &entry.pre_handler {
                Some(handler) => handler(input, state.as_ref())?,
                None => input,
            };
            let output = if streaming {
                Output::Stream(entry.node.stream(state, node_input).await?)
            } else {
                Output::Value(entry.node.invoke(state, node_input).await?)
            };

            let successor = self
                .successors
                .get(&current)
                .ok_or_else(|| AgentError::Graph(format!("node {current} has no successor")))?;
            let (next, output) = match successor {
                Successor::Edge(to) => (to.clone(), output),
                Successor::Branch { branch, targets } => {
                    let (probe, kept) = output.split();
                    let next = branch.route(state, probe).await?;
                    if !targets.contains(&next) {
                        return Err(AgentError::Graph(format!(
                            "branch from {current} chose undeclared target {next}"
                        )));
                    }
                    (next, kept)
                }
            };

            if next == END {
                tracing::debug!(graph = %self.name, steps, "run finished");
                return Ok(output);
            }
            input = output.into_value().await?;
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CompileOptions, NodeOptions, START, StateGraph};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    struct Num(i64);

    impl Concat for Num {
        fn concat(chunks: Vec<Self>) -> Result<Self> {
            if chunks.is_empty() {
                return Err(AgentError::Stream("no chunks".into()));
            }
            Ok(Self(chunks.into_iter().map(|n| n.0).sum()))
        }
    }

    #[derive(Default)]
    struct Visits(AtomicUsize);

    struct AddOne;

    #[async_trait]
    impl Node<Visits, Num> for AddOne {
        async fn invoke(&self, state: &Arc<Visits>, input: Num) -> Result<Num> {
            state.0.fetch_add(1, Ordering::SeqCst);
            Ok(Num(input.0 + 1))
        }
    }

    /// Streams its output as two halves.
    struct Split;

    #[async_trait]
    impl Node<Visits, Num> for Split {
        async fn invoke(&self, _state: &Arc<Visits>, input: Num) -> Result<Num> {
            Ok(input)
        }

        async fn stream(&self, _state: &Arc<Visits>, input: Num) -> Result<StreamReader<Num>> {
            let half = input.0 / 2;
            Ok(StreamReader::from_values(vec![Num(half), Num(input.0 - half)]))
        }
    }

    struct UntilThree;

    #[async_trait]
    impl Branch<Visits, Num> for UntilThree {
        async fn route(&self, _state: &Arc<Visits>, output: StreamReader<Num>) -> Result<String> {
            let total = Num::concat(output.collect_all().await?)?;
            Ok(if total.0 >= 3 { END.into() } else { "add".into() })
        }
    }

    struct Nowhere;

    #[async_trait]
    impl Branch<Visits, Num> for Nowhere {
        async fn route(&self, _state: &Arc<Visits>, _output: StreamReader<Num>) -> Result<String> {
            Ok("elsewhere".into())
        }
    }

    fn looping(max_steps: usize) -> CompiledGraph<Visits, Num> {
        let mut graph = StateGraph::<Visits, Num>::new();
        graph
            .add_node("add", Arc::new(AddOne), NodeOptions::new())
            .unwrap();
        graph.add_edge(START, "add").unwrap();
        graph
            .add_branch("add", Arc::new(UntilThree), &["add", END])
            .unwrap();
        graph
            .compile(CompileOptions {
                max_steps,
                ..CompileOptions::default()
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_loop_until_branch_ends() {
        let state = Arc::new(Visits::default());
        let out = looping(10).invoke(Arc::clone(&state), Num(0)).await.unwrap();
        assert_eq!(out, Num(3));
        assert_eq!(state.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let err = looping(2)
            .invoke(Arc::new(Visits::default()), Num(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::StepLimitExceeded(2)));
    }

    #[tokio::test]
    async fn test_default_step_limit_is_node_count_plus_ten() {
        assert_eq!(looping(0).max_steps(), 11);
    }

    #[tokio::test]
    async fn test_pre_handler_rewrites_input() {
        let mut graph = StateGraph::<Visits, Num>::new();
        graph
            .add_node(
                "add",
                Arc::new(AddOne),
                NodeOptions::new().pre_handler(|input: Num, _state: &Visits| Ok(Num(input.0 * 10))),
            )
            .unwrap();
        graph.add_edge(START, "add").unwrap();
        graph.add_edge("add", END).unwrap();
        let graph = graph.compile(CompileOptions::default()).unwrap();

        let out = graph.invoke(Arc::new(Visits::default()), Num(2)).await.unwrap();
        assert_eq!(out, Num(21));
    }

    #[tokio::test]
    async fn test_stream_keeps_last_node_chunks() {
        let mut graph = StateGraph::<Visits, Num>::new();
        graph.add_node("add", Arc::new(AddOne), NodeOptions::new()).unwrap();
        graph.add_node("split", Arc::new(Split), NodeOptions::new()).unwrap();
        graph.add_edge(START, "add").unwrap();
        graph.add_edge("add", "split").unwrap();
        graph
            .add_branch("split", Arc::new(UntilThree), &["add", END])
            .unwrap();
        let graph = graph.compile(CompileOptions::default()).unwrap();

        let out = graph.stream(Arc::new(Visits::default()), Num(4)).await.unwrap();
        assert_eq!(out.collect_all().await.unwrap(), vec![Num(2), Num(3)]);
    }

    #[tokio::test]
    async fn test_undeclared_branch_target() {
        let mut graph = StateGraph::<Visits, Num>::new();
        graph.add_node("add", Arc::new(AddOne), NodeOptions::new()).unwrap();
        graph.add_edge(START, "add").unwrap();
        graph.add_branch("add", Arc::new(Nowhere), &[END]).unwrap();
        let graph = graph.compile(CompileOptions::default()).unwrap();

        let err = graph.invoke(Arc::new(Visits::default()), Num(0)).await.unwrap_err();
        assert!(matches!(err, AgentError::Graph(_)));
    }
}
