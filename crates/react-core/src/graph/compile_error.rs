//! Graph compilation error.

use thiserror::Error;

/// Error when building or compiling a state graph.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Two nodes registered under one key.
    #[error("duplicate node: {0}")]
    DuplicateNode(String),

    /// `START`/`END` used as a node key.
    #[error("reserved node key: {0}")]
    ReservedKey(String),

    /// An edge or branch references an unregistered node.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A node was given a second edge or branch.
    #[error("node {0} already has a successor")]
    MultipleSuccessors(String),

    /// A node has no edge or branch leaving it.
    #[error("node {0} has no successor")]
    NoSuccessor(String),

    /// Nothing is connected to `START`.
    #[error("graph has no entry edge from START")]
    NoEntry,

    /// A branch declared no targets.
    #[error("branch from {0} declares no targets")]
    EmptyBranch(String),

    /// The trigger mode cannot run this graph shape.
    #[error("node {0} has several predecessors; use TriggerMode::AnyPredecessor")]
    TriggerMode(String),
}
