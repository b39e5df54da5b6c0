//! Graph runner: named nodes, edges and branches, compiled and run with a step bound.
//!
//! Build a `StateGraph`, connect `START` to the entry node, give every node
//! exactly one way out (an edge or a branch), then `compile`. Each run gets
//! its own shared state `S`; every node consumes and produces values of one
//! type `V`.

mod compile_error;
mod compiled;
mod node;
mod state_graph;

pub use compile_error::CompileError;
pub use compiled::CompiledGraph;
pub use node::{Branch, Concat, Node, NodeOptions, PreHandler};
pub use state_graph::{CompileOptions, StateGraph, TriggerMode};

/// Virtual entry node.
pub const START: &str = "__start__";
/// Virtual exit node.
pub const END: &str = "__end__";
