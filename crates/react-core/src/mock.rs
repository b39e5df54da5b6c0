//! Scripted model and tool for tests and examples.
//!
//! `MockModel` replays a fixed script of replies and records every call it
//! serves, including the tool list it was bound to at the time. Models derived
//! through `with_tools` share the script and the records with their parent, so
//! a run that rebinds mid-way still consumes one script in order.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{AgentError, Result};
use crate::message::{Message, ToolCall};
use crate::provider::{ChatModel, GenerationOptions, MessageStream, ToolCallingModel};
use crate::state::set_return_directly;
use crate::stream::StreamReader;
use crate::tool::{ParameterSchema, Tool, ToolResult, ToolSchema};

/// One scripted model turn.
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Whole message (one chunk when streamed)
    Message(Message),
    /// Streamed as these chunks; concatenated for `generate`
    Chunks(Vec<Message>),
    /// Streams the chunks, then fails
    Broken(Vec<Message>, String),
    /// Call fails before producing output
    Error(String),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Message(Message::assistant(content))
    }

    /// Assistant turn with a single tool call
    pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::Message(Message::assistant_with_tools(
            "",
            vec![ToolCall::new(id, name, arguments)],
        ))
    }

    pub fn calls(calls: Vec<ToolCall>) -> Self {
        Self::Message(Message::assistant_with_tools("", calls))
    }
}

/// What the model was asked on one call.
#[derive(Clone, Debug)]
pub struct MockCall {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub options: GenerationOptions,
}

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<MockReply>>,
    fallback: Mutex<Option<MockReply>>,
    calls: Mutex<Vec<MockCall>>,
    bindings: Mutex<Vec<Vec<String>>>,
    fail_next_binding: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MockModel {
    shared: Arc<Shared>,
    tools: Vec<String>,
}

impl MockModel {
    pub fn new(script: Vec<MockReply>) -> Self {
        let shared = Shared::default();
        *lock(&shared.script) = script.into();
        Self {
            shared: Arc::new(shared),
            tools: Vec::new(),
        }
    }

    /// Serves `reply` forever once the script runs out.
    #[must_use]
    pub fn then_repeat(self, reply: MockReply) -> Self {
        *lock(&self.shared.fallback) = Some(reply);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.shared.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.shared.calls).len()
    }

    /// Tool names of every successful `with_tools`, oldest first
    pub fn bindings(&self) -> Vec<Vec<String>> {
        lock(&self.shared.bindings).clone()
    }

    /// Tools bound to this particular instance
    pub fn bound_tool_names(&self) -> Vec<String> {
        self.tools.clone()
    }

    /// Tools bound to whichever instance served the latest call
    pub fn last_seen_tools(&self) -> Vec<String> {
        lock(&self.shared.calls)
            .last()
            .map(|c| c.tools.clone())
            .unwrap_or_default()
    }

    /// Make the next `with_tools` fail
    pub fn fail_next_binding(&self) {
        self.shared.fail_next_binding.store(true, Ordering::SeqCst);
    }

    fn next_reply(&self, messages: &[Message], options: &GenerationOptions) -> Result<MockReply> {
        lock(&self.shared.calls).push(MockCall {
            messages: messages.to_vec(),
            tools: self.tools.clone(),
            options: options.clone(),
        });

        let scripted = lock(&self.shared.script).pop_front();
        scripted
            .or_else(|| lock(&self.shared.fallback).clone())
            .ok_or_else(|| AgentError::Provider("mock script exhausted".into()))
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn generate(&self, messages: &[Message], options: &GenerationOptions) -> Result<Message> {
        match self.next_reply(messages, options)? {
            MockReply::Message(msg) => Ok(msg),
            MockReply::Chunks(chunks) => Message::concat(&chunks),
            MockReply::Broken(_, err) | MockReply::Error(err) => Err(AgentError::Provider(err)),
        }
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<MessageStream> {
        match self.next_reply(messages, options)? {
            MockReply::Message(msg) => Ok(StreamReader::from_value(msg)),
            MockReply::Chunks(chunks) => Ok(StreamReader::from_values(chunks)),
            MockReply::Broken(chunks, err) => {
                let items = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(AgentError::Provider(err))));
                Ok(StreamReader::new(futures::stream::iter(items)))
            }
            MockReply::Error(err) => Err(AgentError::Provider(err)),
        }
    }
}

impl ToolCallingModel for MockModel {
    fn with_tools(&self, tools: Vec<ToolSchema>) -> Result<Arc<dyn ToolCallingModel>> {
        if self.shared.fail_next_binding.swap(false, Ordering::SeqCst) {
            return Err(AgentError::Config("mock binding rejected".into()));
        }
        let names: Vec<String> = tools.into_iter().map(|t| t.name).collect();
        lock(&self.shared.bindings).push(names.clone());
        Ok(Arc::new(Self {
            shared: Arc::clone(&self.shared),
            tools: names,
        }))
    }
}

/// Tool returning a fixed output.
pub struct MockTool {
    name: String,
    output: String,
    fail_with: Option<String>,
    mark_return_directly: bool,
    invocations: AtomicUsize,
}

impl MockTool {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            fail_with: None,
            mark_return_directly: false,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Calls `set_return_directly` while executing
    #[must_use]
    pub const fn marks_return_directly(mut self) -> Self {
        self.mark_return_directly = true;
        self
    }

    #[must_use]
    pub fn failing(mut self, error: impl Into<String>) -> Self {
        self.fail_with = Some(error.into());
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for MockTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name.clone(), format!("Mock tool {}", self.name))
            .param(ParameterSchema::string("input", "Free-form input").optional())
    }

    async fn execute(&self, _call: &ToolCall) -> Result<ToolResult> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if self.mark_return_directly {
            set_return_directly()?;
        }
        match &self.fail_with {
            Some(err) => Err(AgentError::ToolExecution(err.clone())),
            None => Ok(ToolResult::success(self.name.clone(), self.output.clone())),
        }
    }
}
