//! Graph builder.
//!
//! Register nodes with `add_node`, connect them with `add_edge` and
//! `add_branch`, then `compile` into a `CompiledGraph`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::compile_error::CompileError;
use super::compiled::{CompiledGraph, NodeEntry, Successor};
use super::node::{Branch, Node, NodeOptions};
use super::{END, START};

/// When a node with several incoming connections may run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TriggerMode {
    /// Run as soon as any one predecessor completes. Required for loops.
    #[default]
    AnyPredecessor,
    /// Wait for every predecessor; only valid for graphs without joins.
    AllPredecessor,
}

/// Options applied at compile time.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub graph_name: String,
    /// Node executions allowed per run; 0 means node count + 10.
    pub max_steps: usize,
    pub trigger_mode: TriggerMode,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            graph_name: "Graph".into(),
            max_steps: 0,
            trigger_mode: TriggerMode::AnyPredecessor,
        }
    }
}

/// Mutable graph under construction.
pub struct StateGraph<S, V> {
    nodes: HashMap<String, NodeEntry<S, V>>,
    entry: Option<String>,
    successors: HashMap<String, Successor<S, V>>,
}

impl<S, V> Default for StateGraph<S, V>
where
    S: Send + Sync + 'static,
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, V> StateGraph<S, V>
where
    S: Send + Sync + 'static,
    V: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            entry: None,
            successors: HashMap::new(),
        }
    }

    /// Register a node under a unique key.
    pub fn add_node(
        &mut self,
        key: impl Into<String>,
        node: Arc<dyn Node<S, V>>,
        options: NodeOptions<S, V>,
    ) -> Result<&mut Self, CompileError> {
        let key = key.into();
        if key == START || key == END {
            return Err(CompileError::ReservedKey(key));
        }
        if self.nodes.contains_key(&key) {
            return Err(CompileError::DuplicateNode(key));
        }
        let name = options.name.unwrap_or_else(|| key.clone());
        self.nodes.insert(
            key,
            NodeEntry {
                name,
                node,
                pre_handler: options.pre_handler,
            },
        );
        Ok(self)
    }

    /// Unconditional edge. `from` may be `START`, `to` may be `END`.
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<&mut Self, CompileError> {
        let (from, to) = (from.into(), to.into());
        if from == START {
            if self.entry.is_some() {
                return Err(CompileError::MultipleSuccessors(from));
            }
            self.entry = Some(to);
            return Ok(self);
        }
        self.set_successor(from, Successor::Edge(to))
    }

    /// Conditional edge from `from` to one of `targets`.
    pub fn add_branch(
        &mut self,
        from: impl Into<String>,
        branch: Arc<dyn Branch<S, V>>,
        targets: &[&str],
    ) -> Result<&mut Self, CompileError> {
        let from = from.into();
        if targets.is_empty() {
            return Err(CompileError::EmptyBranch(from));
        }
        let targets = targets.iter().map(|t| (*t).to_string()).collect();
        self.set_successor(from, Successor::Branch { branch, targets })
    }

    fn set_successor(
        &mut self,
        from: String,
        successor: Successor<S, V>,
    ) -> Result<&mut Self, CompileError> {
        if self.successors.contains_key(&from) {
            return Err(CompileError::MultipleSuccessors(from));
        }
        self.successors.insert(from, successor);
        Ok(self)
    }

    fn check_target(&self, target: &str) -> Result<(), CompileError> {
        if target == END || self.nodes.contains_key(target) {
            Ok(())
        } else {
            Err(CompileError::NodeNotFound(target.to_string()))
        }
    }

    /// Validate the wiring and freeze the graph.
    pub fn compile(self, options: CompileOptions) -> Result<CompiledGraph<S, V>, CompileError> {
        let entry = self.entry.clone().ok_or(CompileError::NoEntry)?;
        if entry == END {
            return Err(CompileError::NodeNotFound(entry));
        }
        self.check_target(&entry)?;

        let mut predecessors: HashMap<&str, HashSet<&str>> = HashMap::new();
        predecessors.entry(entry.as_str()).or_default().insert(START);

        for (from, successor) in &self.successors {
            if !self.nodes.contains_key(from) {
                return Err(CompileError::NodeNotFound(from.clone()));
            }
            for target in successor.targets() {
                self.check_target(target)?;
                predecessors.entry(target).or_default().insert(from);
            }
        }

        for key in self.nodes.keys() {
            if !self.successors.contains_key(key) {
                return Err(CompileError::NoSuccessor(key.clone()));
            }
        }

        if options.trigger_mode == TriggerMode::AllPredecessor {
            if let Some((node, _)) = predecessors
                .iter()
                .find(|(node, preds)| **node != END && preds.len() > 1)
            {
                return Err(CompileError::TriggerMode((*node).to_string()));
            }
        }

        let max_steps = if options.max_steps == 0 {
            self.nodes.len() + 10
        } else {
            options.max_steps
        };

        Ok(CompiledGraph {
            name: options.graph_name,
            max_steps,
            entry,
            nodes: self.nodes,
            successors: self.successors,
        })
    }
}
