//! ReAct Agent
//!
//! Wires the turn state, tool catalog and model adapter into a graph:
//!
//! ```text
//!   START ──▶ chat ──(tool calls?)──▶ tools ──(return directly?)──▶ direct_return ──▶ END
//!              ▲  └──────no──────▶ END  │
//!              └─────────────no─────────┘
//! ```
//!
//! Every call to `generate` or `stream` is one run: the catalog is reset, the
//! per-call options are applied, and the graph runs with a fresh `TurnState`
//! until the model stops calling tools, a tool result is returned directly,
//! or the step bound is hit.
//!
//! The compiled graph is private to the agent. The graph runner has no
//! subgraph support, so the agent cannot be exported and embedded as a node
//! of a larger graph; wrap `ReactAgent::generate` in your own `Node` instead.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::adapter::SwappableModel;
use crate::catalog::ToolCatalog;
use crate::error::{AgentError, Result};
use crate::graph::{
    Branch, CompileOptions, CompiledGraph, Concat, END, Node, NodeOptions, START, StateGraph,
    TriggerMode,
};
use crate::message::Message;
use crate::options::{AgentOption, RunOptions};
use crate::provider::{ChatModel, GenerationOptions, ToolCallingModel};
use crate::state::{TOOL_SCOPE, ToolScope, TurnState};
use crate::stream::StreamReader;
use crate::tool::{Tool, ToolResult, run_tool};

const NODE_MODEL: &str = "chat";
const NODE_TOOLS: &str = "tools";
const NODE_DIRECT_RETURN: &str = "direct_return";

pub const DEFAULT_GRAPH_NAME: &str = "ReActAgent";
pub const DEFAULT_MODEL_NODE_NAME: &str = "ChatModel";
pub const DEFAULT_TOOLS_NODE_NAME: &str = "Tools";
pub const DEFAULT_MAX_STEP: usize = 12;

/// Transform over a message history.
pub type MessageTransform = Arc<dyn Fn(Vec<Message>) -> Vec<Message> + Send + Sync>;

/// Decides from a model output stream whether the model called tools.
///
/// Implementations own `output`; returning drops it and releases the model
/// stream, whichever way the decision went.
#[async_trait]
pub trait ToolCallChecker: Send + Sync {
    async fn has_tool_calls(&self, output: StreamReader<Message>) -> Result<bool>;
}

/// Answers `true` on the first chunk that carries tool calls, `false` at a
/// clean end of stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstChunkChecker;

#[async_trait]
impl ToolCallChecker for FirstChunkChecker {
    async fn has_tool_calls(&self, mut output: StreamReader<Message>) -> Result<bool> {
        while let Some(chunk) = output.recv().await {
            if chunk?.has_tool_calls() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Reads the whole output and checks the merged message. For models that
/// stream text before their tool calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConcatChecker;

#[async_trait]
impl ToolCallChecker for ConcatChecker {
    async fn has_tool_calls(&self, output: StreamReader<Message>) -> Result<bool> {
        let chunks = output.collect_all().await?;
        if chunks.is_empty() {
            return Ok(false);
        }
        Ok(Message::concat(&chunks)?.has_tool_calls())
    }
}

/// Value flowing between the agent's graph nodes.
#[derive(Clone, Debug)]
pub enum Turn {
    /// Model input, or the results of one tools step
    Messages(Vec<Message>),
    /// One assistant message, or the final answer
    Message(Message),
}

impl Concat for Turn {
    fn concat(chunks: Vec<Self>) -> Result<Self> {
        let mut chunks = chunks;
        if chunks.len() == 1 {
            if let Some(only) = chunks.pop() {
                return Ok(only);
            }
        }
        if chunks.is_empty() {
            return Err(AgentError::Stream("empty turn stream".into()));
        }

        let mut messages = Vec::with_capacity(chunks.len());
        let mut lists = Vec::new();
        for chunk in chunks {
            match chunk {
                Self::Message(m) => messages.push(m),
                Self::Messages(list) => lists.extend(list),
            }
        }
        match (messages.is_empty(), lists.is_empty()) {
            (false, true) => Ok(Self::Message(Message::concat(&messages)?)),
            (true, false) => Ok(Self::Messages(lists)),
            _ => Err(AgentError::Stream("mixed turn chunks".into())),
        }
    }
}

impl Turn {
    fn into_message(self) -> Result<Message> {
        match self {
            Self::Message(m) => Ok(m),
            Self::Messages(_) => Err(AgentError::Graph("expected a single message".into())),
        }
    }
}

/// Shared state of one run.
pub struct RunContext {
    turn: Arc<TurnState>,
    tool_list: Option<HashMap<String, Arc<dyn Tool>>>,
    generation: GenerationOptions,
}

struct ModelNode {
    model: Arc<SwappableModel>,
}

#[async_trait]
impl Node<RunContext, Turn> for ModelNode {
    async fn invoke(&self, state: &Arc<RunContext>, input: Turn) -> Result<Turn> {
        let messages = model_input(input)?;
        let reply = self.model.generate(&messages, &state.generation).await?;
        Ok(Turn::Message(reply))
    }

    async fn stream(&self, state: &Arc<RunContext>, input: Turn) -> Result<StreamReader<Turn>> {
        let messages = model_input(input)?;
        let output = self.model.stream(&messages, &state.generation).await?;
        Ok(output.map(|chunk| Ok(Turn::Message(chunk))))
    }
}

fn model_input(input: Turn) -> Result<Vec<Message>> {
    match input {
        Turn::Messages(messages) => Ok(messages),
        Turn::Message(_) => Err(AgentError::Graph("model step expects a message list".into())),
    }
}

struct ToolsNode {
    catalog: Arc<ToolCatalog>,
}

impl ToolsNode {
    fn resolve(&self, state: &RunContext, name: &str) -> Option<Arc<dyn Tool>> {
        state
            .tool_list
            .as_ref()
            .and_then(|tools| tools.get(name).cloned())
            .or_else(|| self.catalog.visible(name))
    }
}

#[async_trait]
impl Node<RunContext, Turn> for ToolsNode {
    async fn invoke(&self, state: &Arc<RunContext>, input: Turn) -> Result<Turn> {
        let message = input.into_message()?;
        let results = join_all(message.tool_calls.iter().map(|call| {
            let tool = self.resolve(state, &call.name);
            let scope = ToolScope {
                state: Arc::clone(&state.turn),
                call_id: call.id.clone(),
            };
            async move {
                let result = match tool {
                    Some(tool) => TOOL_SCOPE.scope(scope, run_tool(tool.as_ref(), call)).await,
                    None => {
                        tracing::warn!(tool = %call.name, call_id = %call.id, "Model called unknown tool");
                        let err = AgentError::ToolNotFound(call.name.clone());
                        ToolResult::failure(call.name.clone(), err.to_string())
                    }
                };
                result.into_message(&call.id)
            }
        }))
        .await;
        Ok(Turn::Messages(results))
    }
}

struct DirectReturnNode;

#[async_trait]
impl Node<RunContext, Turn> for DirectReturnNode {
    async fn invoke(&self, state: &Arc<RunContext>, input: Turn) -> Result<Turn> {
        let id = state.turn.return_directly_id().unwrap_or_default();
        let Turn::Messages(results) = input else {
            return Err(AgentError::NoMatchingResult(id));
        };
        results
            .into_iter()
            .find(|m| m.tool_call_id.as_deref() == Some(id.as_str()))
            .map(Turn::Message)
            .ok_or(AgentError::NoMatchingResult(id))
    }
}

struct ToolCallBranch {
    checker: Arc<dyn ToolCallChecker>,
}

#[async_trait]
impl Branch<RunContext, Turn> for ToolCallBranch {
    async fn route(&self, _state: &Arc<RunContext>, output: StreamReader<Turn>) -> Result<String> {
        let chunks = output.map(Turn::into_message);
        if self.checker.has_tool_calls(chunks).await? {
            Ok(NODE_TOOLS.into())
        } else {
            Ok(END.into())
        }
    }
}

struct ReturnDirectlyBranch;

#[async_trait]
impl Branch<RunContext, Turn> for ReturnDirectlyBranch {
    async fn route(&self, state: &Arc<RunContext>, output: StreamReader<Turn>) -> Result<String> {
        output.close();
        let next = if state.turn.return_directly_id().is_some() {
            NODE_DIRECT_RETURN
        } else {
            NODE_MODEL
        };
        Ok(next.into())
    }
}

/// Agent configuration
pub struct AgentConfig {
    pub model: Arc<dyn ToolCallingModel>,

    /// Tools advertised from the first model call on
    pub tools: Vec<Arc<dyn Tool>>,

    /// Applied to a copy of the history for each model call; not stored
    pub message_modifier: Option<MessageTransform>,

    /// Replaces the stored history before each model call
    pub message_rewriter: Option<MessageTransform>,

    /// Graph step bound; 0 means the default
    pub max_step: usize,

    /// Tools whose result ends the run as-is
    pub return_directly: HashSet<String>,

    pub tool_call_checker: Arc<dyn ToolCallChecker>,

    pub generation: GenerationOptions,

    pub graph_name: String,
    pub model_node_name: String,
    pub tools_node_name: String,
}

impl AgentConfig {
    pub fn new(model: Arc<dyn ToolCallingModel>) -> Self {
        Self {
            model,
            tools: Vec::new(),
            message_modifier: None,
            message_rewriter: None,
            max_step: DEFAULT_MAX_STEP,
            return_directly: HashSet::new(),
            tool_call_checker: Arc::new(FirstChunkChecker),
            generation: GenerationOptions::default(),
            graph_name: DEFAULT_GRAPH_NAME.into(),
            model_node_name: DEFAULT_MODEL_NODE_NAME.into(),
            tools_node_name: DEFAULT_TOOLS_NODE_NAME.into(),
        }
    }
}

/// Tool-calling agent looping model and tools over a compiled graph.
pub struct ReactAgent {
    graph: Arc<CompiledGraph<RunContext, Turn>>,
    model: Arc<SwappableModel>,
    catalog: Arc<ToolCatalog>,
    generation: GenerationOptions,
    max_step: usize,
}

impl ReactAgent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let max_step = if config.max_step == 0 {
            DEFAULT_MAX_STEP
        } else {
            config.max_step
        };

        let model = Arc::new(SwappableModel::new(config.model));
        let catalog = ToolCatalog::new(&config.tools, Arc::clone(&model))?;
        model.replace_tools(catalog.tool_schemas()?)?;

        let rewriter = config.message_rewriter;
        let modifier = config.message_modifier;
        let model_pre_handler = move |input: Turn, state: &RunContext| -> Result<Turn> {
            match input {
                Turn::Messages(messages) => state.turn.append_input(messages),
                Turn::Message(message) => state.turn.append_input(vec![message]),
            }
            if let Some(rewrite) = &rewriter {
                state.turn.rewrite(|history| rewrite(history));
            }
            let history = state.turn.snapshot_messages();
            Ok(Turn::Messages(match &modifier {
                Some(modify) => modify(history),
                None => history,
            }))
        };

        let return_directly = config.return_directly;
        let tools_pre_handler = move |input: Turn, state: &RunContext| -> Result<Turn> {
            match input {
                Turn::Message(message) => {
                    state.turn.record_tool_calls(&message, &return_directly);
                    Ok(Turn::Message(message))
                }
                Turn::Messages(_) => state
                    .turn
                    .last_message()
                    .map(Turn::Message)
                    .ok_or_else(|| AgentError::Graph("tools step has no message to run".into())),
            }
        };

        let mut graph = StateGraph::<RunContext, Turn>::new();
        graph
            .add_node(
                NODE_MODEL,
                Arc::new(ModelNode {
                    model: Arc::clone(&model),
                }),
                NodeOptions::new()
                    .name(config.model_node_name)
                    .pre_handler(model_pre_handler),
            )?
            .add_node(
                NODE_TOOLS,
                Arc::new(ToolsNode {
                    catalog: Arc::clone(&catalog),
                }),
                NodeOptions::new()
                    .name(config.tools_node_name)
                    .pre_handler(tools_pre_handler),
            )?
            .add_node(
                NODE_DIRECT_RETURN,
                Arc::new(DirectReturnNode),
                NodeOptions::new(),
            )?
            .add_edge(START, NODE_MODEL)?
            .add_branch(
                NODE_MODEL,
                Arc::new(ToolCallBranch {
                    checker: config.tool_call_checker,
                }),
                &[NODE_TOOLS, END],
            )?
            .add_branch(
                NODE_TOOLS,
                Arc::new(ReturnDirectlyBranch),
                &[NODE_MODEL, NODE_DIRECT_RETURN],
            )?
            .add_edge(NODE_DIRECT_RETURN, END)?;

        let graph = graph.compile(CompileOptions {
            graph_name: config.graph_name,
            max_steps: max_step,
            trigger_mode: TriggerMode::AnyPredecessor,
        })?;

        Ok(Self {
            graph: Arc::new(graph),
            model,
            catalog,
            generation: config.generation,
            max_step,
        })
    }

    pub fn builder(model: Arc<dyn ToolCallingModel>) -> ReactAgentBuilder {
        ReactAgentBuilder::new(model)
    }

    /// Run to completion and return the final message.
    pub async fn generate(&self, messages: Vec<Message>, options: &[AgentOption]) -> Result<Message> {
        let context = self.prepare(options)?;
        tracing::info!(graph = %self.graph.name(), "Agent run started");
        let output = self
            .graph
            .invoke(context, Turn::Messages(messages))
            .await
            .and_then(Turn::into_message);
        log_outcome(output.as_ref().map(|_| ()));
        output
    }

    /// Start a run and return its final answer as a stream.
    ///
    /// Option errors are returned here; anything that fails once the run is
    /// under way arrives as an error item on the stream.
    pub fn stream(&self, messages: Vec<Message>, options: &[AgentOption]) -> Result<StreamReader<Message>> {
        let context = self.prepare(options)?;
        let graph = Arc::clone(&self.graph);
        let (writer, reader) = StreamReader::channel();

        tracing::info!(graph = %graph.name(), "Agent stream started");
        tokio::spawn(async move {
            let mut output = match graph.stream(context, Turn::Messages(messages)).await {
                Ok(output) => output,
                Err(e) => {
                    log_outcome(Err(&e));
                    writer.send(Err(e));
                    return;
                }
            };
            while let Some(item) = output.recv().await {
                let failed = item.is_err();
                if let Err(e) = &item {
                    log_outcome(Err(e));
                }
                if !writer.send(item.and_then(Turn::into_message)) || failed {
                    return;
                }
            }
            log_outcome(Ok(()));
        });

        Ok(reader)
    }

    /// Reset the catalog, apply options, rebind the model and create the
    /// run's state.
    fn prepare(&self, options: &[AgentOption]) -> Result<Arc<RunContext>> {
        self.catalog.init();
        let run = RunOptions::resolve(options, &self.catalog)?;
        let generation = run.generation(&self.generation);
        let schemas = match run.model_tools {
            Some(schemas) => schemas,
            None => self.catalog.tool_schemas()?,
        };
        self.model.replace_tools(schemas)?;

        Ok(Arc::new(RunContext {
            turn: Arc::new(TurnState::with_capacity(self.max_step)),
            tool_list: run.tool_list,
            generation,
        }))
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub const fn max_step(&self) -> usize {
        self.max_step
    }
}

fn log_outcome(outcome: std::result::Result<(), &AgentError>) {
    match outcome {
        Ok(()) => tracing::info!("Agent run finished"),
        Err(e) if e.is_step_limit() => tracing::warn!(error = %e, "Agent run hit the step bound"),
        Err(e) => tracing::warn!(error = %e, "Agent run failed"),
    }
}

/// Builder for `ReactAgent`
pub struct ReactAgentBuilder {
    config: AgentConfig,
}

impl ReactAgentBuilder {
    pub fn new(model: Arc<dyn ToolCallingModel>) -> Self {
        Self {
            config: AgentConfig::new(model),
        }
    }

    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.config.tools.push(Arc::new(tool));
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.config.tools.extend(tools);
        self
    }

    #[must_use]
    pub fn message_modifier<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Message>) -> Vec<Message> + Send + Sync + 'static,
    {
        self.config.message_modifier = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn message_rewriter<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<Message>) -> Vec<Message> + Send + Sync + 'static,
    {
        self.config.message_rewriter = Some(Arc::new(f));
        self
    }

    /// Prepend `prompt` as a system message to every model call.
    #[must_use]
    pub fn system_prompt(self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.message_modifier(move |history| {
            let mut messages = Vec::with_capacity(history.len() + 1);
            messages.push(Message::system(prompt.clone()));
            messages.extend(history);
            messages
        })
    }

    #[must_use]
    pub const fn max_step(mut self, max: usize) -> Self {
        self.config.max_step = max;
        self
    }

    #[must_use]
    pub fn return_directly(mut self, tool_name: impl Into<String>) -> Self {
        self.config.return_directly.insert(tool_name.into());
        self
    }

    #[must_use]
    pub fn tool_call_checker(mut self, checker: impl ToolCallChecker + 'static) -> Self {
        self.config.tool_call_checker = Arc::new(checker);
        self
    }

    #[must_use]
    pub fn generation(mut self, options: GenerationOptions) -> Self {
        self.config.generation = options;
        self
    }

    #[must_use]
    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub fn graph_name(mut self, name: impl Into<String>) -> Self {
        self.config.graph_name = name.into();
        self
    }

    #[must_use]
    pub fn node_names(mut self, model: impl Into<String>, tools: impl Into<String>) -> Self {
        self.config.model_node_name = model.into();
        self.config.tools_node_name = tools.into();
        self
    }

    pub fn build(self) -> Result<ReactAgent> {
        ReactAgent::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_chunk_checker_stops_early() {
        let (writer, reader) = StreamReader::channel();
        writer.send(Ok(Message::assistant("thinking")));
        writer.send(Ok(Message::assistant_with_tools(
            "",
            vec![ToolCall::new("c1", "search", json!({}))],
        )));

        // The writer stays open: only an early return can finish this.
        assert!(FirstChunkChecker.has_tool_calls(reader).await.unwrap());
        assert!(writer.is_closed());
    }

    #[tokio::test]
    async fn test_first_chunk_checker_end_of_stream() {
        let reader = StreamReader::from_values(vec![Message::assistant("a"), Message::assistant("b")]);
        assert!(!FirstChunkChecker.has_tool_calls(reader).await.unwrap());
    }

    #[tokio::test]
    async fn test_checker_propagates_stream_errors() {
        let reader = StreamReader::from_error(AgentError::Provider("reset".into()));
        assert!(FirstChunkChecker.has_tool_calls(reader).await.is_err());
    }

    #[tokio::test]
    async fn test_concat_checker_sees_late_calls() {
        let reader = StreamReader::from_values(vec![
            Message::assistant("let me check"),
            Message::assistant_with_tools("", vec![ToolCall::new("c1", "search", json!({}))]),
        ]);
        assert!(ConcatChecker.has_tool_calls(reader).await.unwrap());
        assert!(!ConcatChecker.has_tool_calls(StreamReader::from_values(vec![])).await.unwrap());
    }

    fn context_marking(call_id: &str) -> Arc<RunContext> {
        let turn = TurnState::default();
        turn.record_tool_calls(
            &Message::assistant_with_tools("", vec![ToolCall::new(call_id, "search", json!({}))]),
            &HashSet::from(["search".to_string()]),
        );
        Arc::new(RunContext {
            turn: Arc::new(turn),
            tool_list: None,
            generation: GenerationOptions::default(),
        })
    }

    #[tokio::test]
    async fn test_direct_return_picks_marked_result() {
        let state = context_marking("c2");
        let results = Turn::Messages(vec![Message::tool("one", "c1"), Message::tool("two", "c2")]);
        let out = DirectReturnNode.invoke(&state, results).await.unwrap();
        assert_eq!(out.into_message().unwrap().content, "two");
    }

    #[tokio::test]
    async fn test_direct_return_without_match_fails() {
        let state = context_marking("c9");
        let results = Turn::Messages(vec![Message::tool("one", "c1")]);
        let err = DirectReturnNode.invoke(&state, results).await.unwrap_err();
        assert!(matches!(err, AgentError::NoMatchingResult(id) if id == "c9"));
    }

    #[test]
    fn test_turn_concat() {
        let merged = Turn::concat(vec![
            Turn::Message(Message::assistant("Hel")),
            Turn::Message(Message::assistant("lo")),
        ])
        .unwrap();
        assert_eq!(merged.into_message().unwrap().content, "Hello");

        let results = Turn::concat(vec![Turn::Messages(vec![Message::tool("x", "c1")])]).unwrap();
        assert!(matches!(results, Turn::Messages(list) if list.len() == 1));

        assert!(Turn::concat(vec![]).is_err());
        assert!(
            Turn::concat(vec![
                Turn::Message(Message::assistant("a")),
                Turn::Messages(vec![]),
            ])
            .is_err()
        );
    }
}
