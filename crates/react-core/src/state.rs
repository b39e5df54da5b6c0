//! Turn State
//!
//! Mutable record threaded through one agent run: the accumulated history,
//! which tool each in-flight call id refers to, and the call whose result (if
//! any) ends the run. Every mutation takes the write lock; reads that must be
//! consistent with a mutation take the read lock. Nothing under the lock does
//! I/O.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{AgentError, Result};
use crate::message::Message;

#[derive(Debug, Default)]
struct TurnData {
    messages: Vec<Message>,
    tool_call_id_to_name: HashMap<String, String>,
    return_directly_id: Option<String>,
}

/// Shared state of one run.
#[derive(Debug, Default)]
pub struct TurnState {
    data: RwLock<TurnData>,
}

impl TurnState {
    /// Fresh state; the history is pre-sized from the step bound.
    pub fn with_capacity(step_bound: usize) -> Self {
        Self {
            data: RwLock::new(TurnData {
                messages: Vec::with_capacity(step_bound + 1),
                ..TurnData::default()
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TurnData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TurnData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append model-step input to the history.
    pub fn append_input(&self, input: Vec<Message>) {
        self.write().messages.extend(input);
    }

    /// Replace the whole history with `f(history)`.
    pub fn rewrite<F>(&self, f: F)
    where
        F: FnOnce(Vec<Message>) -> Vec<Message>,
    {
        let mut data = self.write();
        let history = std::mem::take(&mut data.messages);
        data.messages = f(history);
    }

    /// Copy of the history.
    pub fn snapshot_messages(&self) -> Vec<Message> {
        self.read().messages.clone()
    }

    pub fn last_message(&self) -> Option<Message> {
        self.read().messages.last().cloned()
    }

    /// Book-keeping for an assistant message about to be executed by the
    /// tools step: map every call id to its tool, append the message, and
    /// pick the first call whose tool is in `return_directly` (clearing any
    /// choice left over from an earlier step).
    pub fn record_tool_calls(&self, message: &Message, return_directly: &HashSet<String>) {
        let mut data = self.write();
        for call in &message.tool_calls {
            data.tool_call_id_to_name
                .insert(call.id.clone(), call.name.clone());
        }
        data.messages.push(message.clone());
        data.return_directly_id = message
            .tool_calls
            .iter()
            .find(|call| return_directly.contains(&call.name))
            .map(|call| call.id.clone());
    }

    /// Mark `call_id` as the call whose result ends the run. Last call wins.
    pub fn set_return_directly(&self, call_id: &str) -> Result<()> {
        let mut data = self.write();
        if !data.tool_call_id_to_name.contains_key(call_id) {
            return Err(AgentError::UnknownToolCall(call_id.to_string()));
        }
        data.return_directly_id = Some(call_id.to_string());
        Ok(())
    }

    pub fn return_directly_id(&self) -> Option<String> {
        self.read().return_directly_id.clone()
    }

    pub fn tool_name(&self, call_id: &str) -> Option<String> {
        self.read().tool_call_id_to_name.get(call_id).cloned()
    }
}

/// Run state plus the call currently being executed.
#[derive(Clone)]
pub(crate) struct ToolScope {
    pub state: Arc<TurnState>,
    pub call_id: String,
}

tokio::task_local! {
    pub(crate) static TOOL_SCOPE: ToolScope;
}

/// Make the result of the currently executing tool call the final answer.
///
/// Only meaningful inside `Tool::execute` during an agent run. Takes
/// precedence over the configured return-directly tool names; when several
/// tools call it in one step, the last call wins.
pub fn set_return_directly() -> Result<()> {
    TOOL_SCOPE
        .try_with(|scope| scope.state.set_return_directly(&scope.call_id))
        .unwrap_or(Err(AgentError::OutsideToolScope))
}

/// Name of the tool whose call is currently executing.
pub fn current_tool_name() -> Option<String> {
    TOOL_SCOPE
        .try_with(|scope| scope.state.tool_name(&scope.call_id))
        .ok()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;
    use serde_json::json;

    fn two_calls() -> Message {
        Message::assistant_with_tools(
            "",
            vec![
                ToolCall::new("c1", "search", json!({})),
                ToolCall::new("c2", "finish", json!({})),
            ],
        )
    }

    #[test]
    fn test_record_maps_ids_and_appends() {
        let state = TurnState::with_capacity(4);
        state.append_input(vec![Message::user("hi")]);
        state.record_tool_calls(&two_calls(), &HashSet::new());

        assert_eq!(state.snapshot_messages().len(), 2);
        assert_eq!(state.tool_name("c1").as_deref(), Some("search"));
        assert_eq!(state.tool_name("c2").as_deref(), Some("finish"));
        assert_eq!(state.return_directly_id(), None);
    }

    #[test]
    fn test_static_return_directly_first_match() {
        let state = TurnState::default();
        let names: HashSet<String> = ["finish".to_string(), "search".to_string()].into();
        state.record_tool_calls(&two_calls(), &names);
        assert_eq!(state.return_directly_id().as_deref(), Some("c1"));

        // A later step without a match clears the previous choice.
        state.record_tool_calls(&Message::assistant_with_tools("", vec![]), &names);
        assert_eq!(state.return_directly_id(), None);
    }

    #[test]
    fn test_explicit_mark_requires_known_id() {
        let state = TurnState::default();
        assert!(matches!(
            state.set_return_directly("nope"),
            Err(AgentError::UnknownToolCall(_))
        ));

        state.record_tool_calls(&two_calls(), &HashSet::new());
        state.set_return_directly("c1").unwrap();
        state.set_return_directly("c2").unwrap();
        assert_eq!(state.return_directly_id().as_deref(), Some("c2"));
    }

    #[test]
    fn test_rewrite_replaces_history() {
        let state = TurnState::default();
        state.append_input(vec![Message::user("a"), Message::user("b")]);
        state.rewrite(|mut history| history.split_off(1));
        let history = state.snapshot_messages();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "b");
    }

    #[test]
    fn test_helpers_outside_scope() {
        assert!(matches!(set_return_directly(), Err(AgentError::OutsideToolScope)));
        assert!(current_tool_name().is_none());
    }

    #[tokio::test]
    async fn test_helpers_inside_scope() {
        let state = Arc::new(TurnState::default());
        state.record_tool_calls(&two_calls(), &HashSet::new());
        let scope = ToolScope {
            state: Arc::clone(&state),
            call_id: "c2".into(),
        };

        TOOL_SCOPE
            .scope(scope, async {
                assert_eq!(current_tool_name().as_deref(), Some("finish"));
                set_return_directly().unwrap();
            })
            .await;

        assert_eq!(state.return_directly_id().as_deref(), Some("c2"));
    }
}
